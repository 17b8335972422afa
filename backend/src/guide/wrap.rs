use super::{DrawInstruction, Point};
use crate::pdf_metrics::TextMeasure;

/// Greedy word wrap of `text` into lines no wider than `max_width`.
///
/// Lines start at `anchor` and move down by `line_height`. Words are never
/// split, so a word wider than `max_width` gets a line of its own.
pub fn wrap_paragraph<M: TextMeasure + ?Sized>(
    text: &str,
    anchor: Point,
    max_width: f32,
    line_height: f32,
    font: &str,
    size: f32,
    measure: &M,
) -> Vec<DrawInstruction> {
    wrap_lines(text, max_width, |line| measure.string_width(line, font, size))
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let y = anchor.y - i as f32 * line_height;
            DrawInstruction::new(anchor.x, y, line, font, size)
        })
        .collect()
}

/// The line breaking behind [`wrap_paragraph`], with the metric as a closure.
pub fn wrap_lines(text: &str, max_width: f32, width: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_owned()
        } else {
            format!("{current} {word}")
        };
        if width(&candidate) <= max_width {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = word.to_owned();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

//! Places field values on the page glyph by glyph.

use time::Date;
use time::macros::format_description;

use super::{DrawInstruction, FieldSpec, Layout, Point, RenderRequest, SpacingPolicy};

/// Lays out every filled field of `layout` except the long-text one.
///
/// Fields missing from `request`, blank after trimming, or holding a date
/// that doesn't parse produce nothing. Keys of `request` that the layout
/// doesn't know are ignored.
pub fn render(request: &RenderRequest, layout: &Layout) -> Vec<DrawInstruction> {
    let long_text = layout.long_text.as_ref().map(|l| l.name.as_str());
    let mut out = Vec::new();
    for field in &layout.fields {
        if Some(field.name.as_str()) == long_text {
            continue;
        }
        let Some(value) = request.value(&field.name) else {
            continue;
        };
        render_field(field, layout.font_for(field), value, &mut out);
    }
    out
}

fn render_field(field: &FieldSpec, font: &str, value: &str, out: &mut Vec<DrawInstruction>) {
    let Point { x, y } = field.anchor;
    match &field.spacing {
        SpacingPolicy::Natural => {
            out.push(DrawInstruction::new(x, y, value, font, field.size));
        }
        SpacingPolicy::Date {
            day_pitch,
            month_pitch,
            year_pitch,
            block_gap,
        } => {
            let Some(date) = parse_date(value) else {
                log::debug!("Unparseable date {value:?} in {}, leaving blank", field.name);
                return;
            };
            let blocks = [
                (format!("{:02}", date.day()), *day_pitch),
                (format!("{:02}", u8::from(date.month())), *month_pitch),
                (format!("{:04}", date.year()), *year_pitch),
            ];
            let mut x = x;
            for (n, (digits, pitch)) in blocks.iter().enumerate() {
                if n > 0 {
                    x += block_gap;
                }
                let last = digits.chars().count() - 1;
                for (i, c) in digits.chars().enumerate() {
                    out.push(DrawInstruction::new(x, y, c, font, field.size));
                    if i < last {
                        x += pitch;
                    }
                }
            }
        }
        policy => {
            let mut x = x;
            for (i, c) in value.chars().enumerate() {
                out.push(DrawInstruction::new(x, y, c, font, field.size));
                x += policy.advance(i, c);
            }
        }
    }
}

/// Accepts `YYYY-MM-DD`, then `DD/MM/YYYY`. Day and month may be written
/// with one digit.
pub fn parse_date(value: &str) -> Option<Date> {
    let iso = format_description!("[year]-[month padding:none]-[day padding:none]");
    let local = format_description!("[day padding:none]/[month padding:none]/[year]");
    Date::parse(value, iso)
        .or_else(|_| Date::parse(value, local))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::LayoutRegistry;
    use fxhash::FxHashMap;

    fn field(name: &str, x: f32, spacing: SpacingPolicy) -> FieldSpec {
        FieldSpec {
            name: name.to_owned(),
            anchor: Point::new(x, 100.0),
            size: 12.0,
            spacing,
            font: None,
        }
    }

    fn layout(fields: Vec<FieldSpec>) -> Layout {
        Layout {
            version: "test".to_owned(),
            description: String::new(),
            page_size: crate::guide::A4,
            font: "Helvetica".to_owned(),
            fields,
            long_text: None,
        }
    }

    fn xs(out: &[DrawInstruction]) -> Vec<f32> {
        out.iter().map(|d| d.x).collect()
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-3, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn uniform_pitch_places_glyph_k_at_k_pitches() {
        let layout = layout(vec![field("cbo", 504.5, SpacingPolicy::Uniform { pitch: 9.0 })]);
        let request: RenderRequest = [("cbo", "225125")].into_iter().collect();

        let out = render(&request, &layout);
        let expected: Vec<f32> = (0..6).map(|k| 504.5 + k as f32 * 9.0).collect();
        assert_close(&xs(&out), &expected);
        assert_eq!(
            out.iter().map(|d| d.text.as_str()).collect::<String>(),
            "225125"
        );
        assert!(out.iter().all(|d| d.y == 100.0 && d.size == 12.0));
    }

    #[test]
    fn per_index_sums_table_then_saturates_with_fallback() {
        let layout = layout(vec![field(
            "id",
            0.0,
            SpacingPolicy::PerIndex {
                pitches: vec![1.0, 2.0, 3.0],
                fallback: 10.0,
            },
        )]);
        let request: RenderRequest = [("id", "abcdef")].into_iter().collect();

        let out = render(&request, &layout);
        assert_close(&xs(&out), &[0.0, 1.0, 3.0, 6.0, 16.0, 26.0]);
    }

    #[test]
    fn per_char_keys_advance_on_glyph_drawn() {
        let pitches: FxHashMap<String, f32> = [("$".to_owned(), 20.0)].into_iter().collect();
        let layout = layout(vec![field(
            "valor",
            0.0,
            SpacingPolicy::PerChar {
                pitches,
                fallback: 10.0,
            },
        )]);
        let request: RenderRequest = [("valor", "R$12")].into_iter().collect();

        let out = render(&request, &layout);
        assert_close(&xs(&out), &[0.0, 10.0, 30.0, 40.0]);
    }

    #[test]
    fn natural_draws_one_run() {
        let layout = layout(vec![field("nome", 65.0, SpacingPolicy::Natural)]);
        let request: RenderRequest = [("nome", "  Maria da Silva ")].into_iter().collect();

        let out = render(&request, &layout);
        assert_eq!(out, vec![DrawInstruction::new(65.0, 100.0, "Maria da Silva", "Helvetica", 12.0)]);
    }

    fn date_layout() -> Layout {
        layout(vec![
            field(
                "data",
                54.5,
                SpacingPolicy::Date {
                    day_pitch: 11.0,
                    month_pitch: 11.0,
                    year_pitch: 11.0,
                    block_gap: 17.0,
                },
            ),
            field("nome", 65.0, SpacingPolicy::Natural),
        ])
    }

    #[test]
    fn date_forms_render_identically() {
        let layout = date_layout();
        let iso: RenderRequest = [("data", "2024-03-07")].into_iter().collect();
        let local: RenderRequest = [("data", "07/03/2024")].into_iter().collect();

        let a = render(&iso, &layout);
        let b = render(&local, &layout);
        assert_eq!(a, b);
        assert_eq!(
            a.iter().map(|d| d.text.as_str()).collect::<String>(),
            "07032024"
        );
    }

    #[test]
    fn single_digit_day_and_month_are_padded() {
        let layout = date_layout();
        let padded: RenderRequest = [("data", "07/03/2024")].into_iter().collect();
        let expected = render(&padded, &layout);
        assert_eq!(expected.len(), 8);

        for value in ["7/3/2024", "2024-3-7", "07/3/2024", "2024-03-7"] {
            let request: RenderRequest = [("data", value)].into_iter().collect();
            assert_eq!(render(&request, &layout), expected, "{value}");
        }
    }

    #[test]
    fn date_inserts_block_gap_between_components() {
        let layout = date_layout();
        let request: RenderRequest = [("data", "2024-03-07")].into_iter().collect();

        let out = render(&request, &layout);
        assert_close(
            &xs(&out),
            &[54.5, 65.5, 82.5, 93.5, 110.5, 121.5, 132.5, 143.5],
        );
    }

    #[test]
    fn unparseable_date_is_blank_and_isolated() {
        let layout = date_layout();
        let request: RenderRequest = [("data", "not-a-date"), ("nome", "Ana")]
            .into_iter()
            .collect();

        let out = render(&request, &layout);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Ana");
    }

    #[test]
    fn parse_date_rejects_impossible_dates() {
        assert!(parse_date("2024-02-30").is_none());
        assert!(parse_date("31/04/2024").is_none());
        assert!(parse_date("2024-02-29").is_some());
    }

    #[test]
    fn blank_missing_and_unknown_fields_draw_nothing() {
        let layout = layout(vec![
            field("a", 0.0, SpacingPolicy::Uniform { pitch: 5.0 }),
            field("b", 0.0, SpacingPolicy::Natural),
        ]);
        let request: RenderRequest = [("a", " \t "), ("unknown", "x")].into_iter().collect();
        assert!(render(&request, &layout).is_empty());
    }

    #[test]
    fn carteira_and_date_scenario() {
        let registry = LayoutRegistry::builtin().unwrap();
        let layout = registry.get("petrobras-v1").unwrap();
        let request: RenderRequest = [
            ("numero_carteira", "1234567890123"),
            ("data_atendimento", "2024-03-07"),
        ]
        .into_iter()
        .collect();

        let out = render(&request, &layout);
        assert_eq!(out.len(), 21);
        assert!(out.iter().all(|d| d.text.chars().count() == 1));

        let carteira = &out[..13];
        assert_eq!(carteira[0].x, 56.0);
        assert!(carteira.windows(2).all(|w| w[1].x > w[0].x));
        assert!(carteira.iter().all(|d| d.y == 618.0));

        let date = &out[13..];
        let steps: Vec<f32> = date.windows(2).map(|w| w[1].x - w[0].x).collect();
        let digit = steps[0];
        assert!(steps[1] > digit && steps[3] > digit);
        for i in [0, 2, 4, 5, 6] {
            assert!((steps[i] - digit).abs() < 1e-3);
        }
    }
}

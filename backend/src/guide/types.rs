use anyhow::{Result, bail};
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::pdf_metrics;

/// Font used when neither the layout nor the field names one.
pub const DEFAULT_FONT: &str = "Helvetica";

/// A4 in PDF points.
pub const A4: (f32, f32) = (595.2756, 841.8898);

/// A position in page space, in points, with the origin at the bottom-left.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Point {
        Point { x, y }
    }
}

/// How the glyphs of a field are spaced horizontally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpacingPolicy {
    /// The same advance after every glyph.
    Uniform { pitch: f32 },
    /// `pitches[i]` after glyph `i`, `fallback` past the end of the table.
    PerIndex { pitches: Vec<f32>, fallback: f32 },
    /// Advance keyed by the glyph just drawn, `fallback` for unlisted glyphs.
    PerChar {
        pitches: FxHashMap<String, f32>,
        fallback: f32,
    },
    /// `DD MM YYYY` boxes: each component spaced by its own pitch, with
    /// `block_gap` between components.
    Date {
        day_pitch: f32,
        month_pitch: f32,
        year_pitch: f32,
        block_gap: f32,
    },
    /// The whole value in one run at the anchor.
    Natural,
}

impl SpacingPolicy {
    /// Horizontal advance after drawing `glyph` at position `index`.
    ///
    /// Only meaningful for the per-glyph policies; `Date` and `Natural` lay
    /// out their runs themselves and advance by nothing here.
    pub fn advance(&self, index: usize, glyph: char) -> f32 {
        match self {
            SpacingPolicy::Uniform { pitch } => *pitch,
            SpacingPolicy::PerIndex { pitches, fallback } => {
                pitches.get(index).copied().unwrap_or(*fallback)
            }
            SpacingPolicy::PerChar { pitches, fallback } => {
                let mut buf = [0; 4];
                pitches
                    .get(&*glyph.encode_utf8(&mut buf))
                    .copied()
                    .unwrap_or(*fallback)
            }
            SpacingPolicy::Date { .. } | SpacingPolicy::Natural => 0.0,
        }
    }

    fn validate(&self, field: &str) -> Result<()> {
        let pitches: Vec<f32> = match self {
            SpacingPolicy::Uniform { pitch } => vec![*pitch],
            SpacingPolicy::PerIndex { pitches, fallback } => {
                pitches.iter().copied().chain([*fallback]).collect()
            }
            SpacingPolicy::PerChar { pitches, fallback } => {
                if let Some(key) = pitches.keys().find(|k| k.chars().count() != 1) {
                    bail!("field {field}: pitch key {key:?} must be a single character");
                }
                pitches.values().copied().chain([*fallback]).collect()
            }
            SpacingPolicy::Date {
                day_pitch,
                month_pitch,
                year_pitch,
                block_gap,
            } => vec![*day_pitch, *month_pitch, *year_pitch, *block_gap],
            SpacingPolicy::Natural => Vec::new(),
        };
        if pitches.iter().any(|p| !p.is_finite() || *p < 0.0) {
            bail!("field {field}: pitches must be finite and non-negative");
        }
        Ok(())
    }
}

/// One entry of a layout's field table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(with = "super::ser::point")]
    pub anchor: Point,
    pub size: f32,
    pub spacing: SpacingPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

/// The free-text field that is word-wrapped instead of placed glyph by glyph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LongTextSpec {
    pub name: String,
    #[serde(with = "super::ser::point")]
    pub anchor: Point,
    pub size: f32,
    pub max_width: f32,
    pub line_height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

fn default_page_size() -> (f32, f32) {
    A4
}

fn default_font() -> String {
    DEFAULT_FONT.to_owned()
}

/// A versioned field table for one revision of the printed guide.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_page_size")]
    pub page_size: (f32, f32),
    #[serde(default = "default_font")]
    pub font: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub long_text: Option<LongTextSpec>,
}

impl Layout {
    /// Parses and validates a layout from its JSON form.
    pub fn from_json(text: &str) -> Result<Layout> {
        let layout: Layout = serde_json::from_str(text)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            bail!("layout version must not be empty");
        }
        let (w, h) = self.page_size;
        if !(positive(w) && positive(h)) {
            bail!("layout {}: page size must be positive", self.version);
        }
        check_font(&self.version, &self.font)?;

        let mut names = FxHashSet::default();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                bail!("layout {}: duplicate field {}", self.version, field.name);
            }
            if !positive(field.size) {
                bail!("layout {}: field {} needs a positive size", self.version, field.name);
            }
            if let Some(font) = &field.font {
                check_font(&self.version, font)?;
            }
            field.spacing.validate(&field.name)?;
        }

        if let Some(long_text) = &self.long_text {
            if names.contains(long_text.name.as_str()) {
                bail!(
                    "layout {}: {} is both a long-text and a regular field",
                    self.version,
                    long_text.name
                );
            }
            if !(positive(long_text.size)
                && positive(long_text.max_width)
                && positive(long_text.line_height))
            {
                bail!(
                    "layout {}: long-text size, width and line height must be positive",
                    self.version
                );
            }
            if let Some(font) = &long_text.font {
                check_font(&self.version, font)?;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn font_for<'a>(&'a self, field: &'a FieldSpec) -> &'a str {
        field.font.as_deref().unwrap_or(&self.font)
    }

    pub fn font_for_long_text<'a>(&'a self, long_text: &'a LongTextSpec) -> &'a str {
        long_text.font.as_deref().unwrap_or(&self.font)
    }

    /// Names of every field this layout fills, long text last.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.long_text.iter().map(|l| l.name.as_str()))
            .collect()
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn check_font(version: &str, font: &str) -> Result<()> {
    if !pdf_metrics::has_metrics(font) {
        bail!("layout {version}: no metrics for font {font}");
    }
    Ok(())
}

/// Positioned text, the unit handed to the PDF overlay.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawInstruction {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub font: String,
    pub size: f32,
}

impl DrawInstruction {
    pub fn new(x: f32, y: f32, text: impl Into<String>, font: &str, size: f32) -> DrawInstruction {
        DrawInstruction {
            x,
            y,
            text: text.into(),
            font: font.to_owned(),
            size,
        }
    }
}

/// Raw field values for one fill request.
#[derive(Clone, Debug, Default)]
pub struct RenderRequest {
    values: FxHashMap<String, String>,
}

impl RenderRequest {
    pub fn new() -> RenderRequest {
        RenderRequest::default()
    }

    /// Builds a request from a JSON object.
    ///
    /// Strings are taken as-is, numbers and booleans by their text. `null`,
    /// arrays and nested objects are dropped. Returns `None` if `json` is not
    /// an object or has no keys at all.
    pub fn from_json(json: &serde_json::Value) -> Option<RenderRequest> {
        let object = json.as_object().filter(|o| !o.is_empty())?;
        let mut request = RenderRequest::new();
        for (name, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => {
                    log::debug!("Ignoring non-scalar value for {name}");
                    continue;
                }
            };
            request.insert(name.clone(), text);
        }
        Some(request)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// The trimmed value of `name`, or `None` when absent or blank.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenderRequest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut request = RenderRequest::new();
        for (k, v) in iter {
            request.insert(k, v);
        }
        request
    }
}

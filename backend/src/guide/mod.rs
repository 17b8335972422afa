mod engine;
mod registry;
mod types;
mod wrap;

pub use engine::*;
pub use registry::*;
pub use types::*;
pub use wrap::*;

use crate::pdf_metrics::TextMeasure;

/// Renders every field of `request` with `layout`, including the long-text
/// paragraph, in drawing order.
pub fn compose<M: TextMeasure + ?Sized>(
    request: &RenderRequest,
    layout: &Layout,
    measure: &M,
) -> Vec<DrawInstruction> {
    let mut instructions = render(request, layout);
    if let Some(long_text) = &layout.long_text {
        if let Some(text) = request.value(&long_text.name) {
            instructions.extend(wrap_paragraph(
                text,
                long_text.anchor,
                long_text.max_width,
                long_text.line_height,
                layout.font_for_long_text(long_text),
                long_text.size,
                measure,
            ));
        }
    }
    instructions
}

mod ser {
    use super::*;
    use serde::{Deserialize, ser::SerializeSeq};

    pub mod point {
        use super::*;
        pub fn serialize<S>(data: &Point, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            let mut seq = serializer.serialize_seq(Some(2))?;
            seq.serialize_element(&data.x)?;
            seq.serialize_element(&data.y)?;
            seq.end()
        }
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Point, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let [x, y] = <[f32; 2]>::deserialize(deserializer)?;
            Ok(Point::new(x, y))
        }
    }
}

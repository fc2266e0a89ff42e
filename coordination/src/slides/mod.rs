//! Slide content conversion
//!
//! - [`markup`]: inline markup in content fragments -> plain text, styled runs
//!   and list markers
//! - [`batch`]: corrected slide spec -> ordered tool calls for one slide

pub mod batch;
pub mod markup;

pub use batch::{
    build_slide_batch, placeholder_object_id, slide_object_id, BulletPreset,
    PlaceholderIdMapping, SlideBatch, ToolCall,
};
pub use markup::{decode_entities, parse_inline_markup, ListKind, ListMarker, TextModel, TextRun};

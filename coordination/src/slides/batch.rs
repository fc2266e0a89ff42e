//! Slide spec -> tool-call batch
//!
//! Every batch starts by replacing the whole slide, so applying the same
//! batch twice leaves the deck in the same state as applying it once.
//! Object ids are derived from the plan id and slide index only.

use serde::{Deserialize, Serialize};

use super::markup::{parse_inline_markup, ListKind, TextModel};
use crate::plan::{PlanId, SlideSpec};
use crate::template::{PlaceholderRole, TemplateLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulletPreset {
    BulletDiscCircleSquare,
    NumberedDecimalAlphaRoman,
}

impl From<ListKind> for BulletPreset {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Unordered => Self::BulletDiscCircleSquare,
            ListKind::Ordered => Self::NumberedDecimalAlphaRoman,
        }
    }
}

/// Binds a layout placeholder to the object id it gets on the new slide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderIdMapping {
    pub role: PlaceholderRole,
    pub layout_object_id: String,
    pub object_id: String,
}

/// One request against the slide-editing collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCall {
    /// Delete the slide if present, then create it from the layout
    ReplaceSlide {
        slide_object_id: String,
        layout_id: String,
        insertion_index: usize,
        placeholders: Vec<PlaceholderIdMapping>,
    },
    InsertText {
        object_id: String,
        text: String,
    },
    StyleText {
        object_id: String,
        start: usize,
        end: usize,
        bold: bool,
        italic: bool,
        underline: bool,
    },
    CreateBullets {
        object_id: String,
        start: usize,
        end: usize,
        preset: BulletPreset,
    },
    SetSpeakerNotes {
        slide_object_id: String,
        text: String,
    },
}

/// All tool calls for one slide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideBatch {
    pub plan_id: PlanId,
    pub slide_index: usize,
    pub layout_id: String,
    pub slide_object_id: String,
    pub calls: Vec<ToolCall>,
}

impl SlideBatch {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Object id of the slide built for `slide_index` of `plan_id`
pub fn slide_object_id(plan_id: &str, slide_index: usize) -> String {
    let prefix: String = plan_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(12)
        .collect();
    format!("deck_{}_{}", prefix, slide_index)
}

/// Object id of a placeholder on a built slide
pub fn placeholder_object_id(slide_object_id: &str, role: &PlaceholderRole) -> String {
    format!(
        "{}_{}_{}",
        slide_object_id,
        role.kind.as_str().to_ascii_lowercase(),
        role.index.unwrap_or(0)
    )
}

/// Convert a corrected spec into its batch.
///
/// Roles the layout does not expose are skipped; run correction first.
pub fn build_slide_batch(
    plan_id: &str,
    slide_index: usize,
    spec: &SlideSpec,
    layout: &TemplateLayout,
) -> SlideBatch {
    let slide_id = slide_object_id(plan_id, slide_index);
    let layout_ids = layout.placeholder_map();

    let mut placeholders = Vec::new();
    let mut text_calls = Vec::new();
    for (role, fragment) in &spec.content {
        let Some(layout_object_id) = layout_ids.get(role) else {
            continue;
        };
        let object_id = placeholder_object_id(&slide_id, role);
        placeholders.push(PlaceholderIdMapping {
            role: *role,
            layout_object_id: layout_object_id.clone(),
            object_id: object_id.clone(),
        });
        text_calls.extend(text_model_calls(&object_id, &parse_inline_markup(fragment)));
    }

    let mut calls = Vec::with_capacity(text_calls.len() + 2);
    calls.push(ToolCall::ReplaceSlide {
        slide_object_id: slide_id.clone(),
        layout_id: spec.layout_id.clone(),
        insertion_index: slide_index,
        placeholders,
    });
    calls.extend(text_calls);
    if let Some(notes) = spec.speaker_notes() {
        calls.push(ToolCall::SetSpeakerNotes {
            slide_object_id: slide_id.clone(),
            text: notes,
        });
    }

    SlideBatch {
        plan_id: plan_id.to_string(),
        slide_index,
        layout_id: spec.layout_id.clone(),
        slide_object_id: slide_id,
        calls,
    }
}

fn text_model_calls(object_id: &str, model: &TextModel) -> Vec<ToolCall> {
    if model.is_empty() {
        return Vec::new();
    }

    let mut calls = vec![ToolCall::InsertText {
        object_id: object_id.to_string(),
        text: model.raw_text.clone(),
    }];
    calls.extend(model.runs.iter().map(|run| ToolCall::StyleText {
        object_id: object_id.to_string(),
        start: run.start,
        end: run.end,
        bold: run.bold,
        italic: run.italic,
        underline: run.underline,
    }));
    calls.extend(model.lists.iter().map(|marker| ToolCall::CreateBullets {
        object_id: object_id.to_string(),
        start: marker.start,
        end: marker.end,
        preset: marker.kind.into(),
    }));
    calls
}

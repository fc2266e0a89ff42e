//! Plan and slide spec types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::template::{LayoutCatalog, PlaceholderRole};

/// Unique identifier for a plan. A revision keeps the id of the plan it replaces.
pub type PlanId = String;

/// Content address of a [`SlideSpec`] (blake3, hex encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slide of a plan: the layout to use and the content for each
/// placeholder role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSpec {
    pub layout_id: String,
    /// Placeholder role -> content fragment (text with inline markup)
    #[serde(default)]
    pub content: BTreeMap<PlaceholderRole, String>,
    /// Free-form guidance from the planner, carried into speaker notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Adjustment notes merged in by "retry with note"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<String>,
}

impl SlideSpec {
    pub fn new(layout_id: impl Into<String>) -> Self {
        Self {
            layout_id: layout_id.into(),
            content: BTreeMap::new(),
            instructions: None,
            adjustments: Vec::new(),
        }
    }

    pub fn with_content(mut self, role: PlaceholderRole, fragment: impl Into<String>) -> Self {
        self.content.insert(role, fragment.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Merge a human adjustment note into the spec. Blank notes are ignored.
    pub fn with_adjustment(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        let note = note.trim();
        if !note.is_empty() {
            self.adjustments.push(note.to_string());
        }
        self
    }

    /// Text for the slide's speaker notes: instructions followed by any
    /// adjustment notes, one per line.
    pub fn speaker_notes(&self) -> Option<String> {
        let mut lines: Vec<String> = Vec::new();
        if let Some(instructions) = self.instructions.as_deref().map(str::trim) {
            if !instructions.is_empty() {
                lines.push(instructions.to_string());
            }
        }
        lines.extend(self.adjustments.iter().map(|a| format!("Adjustment: {}", a)));
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    /// Content address over every field, length-prefixed so that no two
    /// distinct specs share an encoding.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        let mut field = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        field(self.layout_id.as_bytes());
        field(&(self.content.len() as u64).to_le_bytes());
        for (role, fragment) in &self.content {
            field(role.to_string().as_bytes());
            field(fragment.as_bytes());
        }
        match &self.instructions {
            Some(instructions) => {
                field(b"1");
                field(instructions.as_bytes());
            }
            None => field(b"0"),
        }
        field(&(self.adjustments.len() as u64).to_le_bytes());
        for note in &self.adjustments {
            field(note.as_bytes());
        }

        Fingerprint(hasher.finalize().to_hex().to_string())
    }
}

/// Errors for plan validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("plan has no slides")]
    Empty,

    #[error("slide {slide_index} references unknown layout '{layout_id}'")]
    UnknownLayout {
        slide_index: usize,
        layout_id: String,
    },
}

/// Result type for plan operations
pub type PlanResult<T> = Result<T, PlanError>;

/// Ordered sequence of slide specs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub slides: Vec<SlideSpec>,
}

impl Plan {
    /// Create a plan with a fresh id
    pub fn new(slides: Vec<SlideSpec>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            slides,
        }
    }

    pub fn with_id(id: impl Into<PlanId>, slides: Vec<SlideSpec>) -> Self {
        Self {
            id: id.into(),
            slides,
        }
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Every slide must reference a layout the catalog knows.
    pub fn validate(&self, catalog: &LayoutCatalog) -> PlanResult<()> {
        if self.slides.is_empty() {
            return Err(PlanError::Empty);
        }
        for (slide_index, slide) in self.slides.iter().enumerate() {
            if !catalog.contains(&slide.layout_id) {
                return Err(PlanError::UnknownLayout {
                    slide_index,
                    layout_id: slide.layout_id.clone(),
                });
            }
        }
        Ok(())
    }
}

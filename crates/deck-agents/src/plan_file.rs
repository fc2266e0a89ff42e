//! Plan documents and content files on disk.
//!
//! Plans are exchanged in the planner's document shape:
//!
//! ```json
//! {
//!   "presentation_plan": [
//!     {
//!       "objectId": "layout_content",
//!       "content": { "TITLE": { "null": "Q3 <b>review</b>" }, "BODY": { "1": "<p>...</p>" } },
//!       "instructions": "Keep it short"
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use deck_coordination::template::RoleParseError;
use deck_coordination::{Plan, PlaceholderRole, SlideSpec};
use serde::{Deserialize, Serialize};

/// Index key used for placeholders without an index
const NO_INDEX: &str = "null";

/// Extensions accepted for raw presentation content
pub const CONTENT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

#[derive(Debug, thiserror::Error)]
pub enum PlanFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid plan document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("slide {slide}: {source}")]
    Role {
        slide: usize,
        #[source]
        source: RoleParseError,
    },

    #[error("plan document has no slides")]
    Empty,

    #[error("unsupported content file {0} (expected .txt, .md or .markdown)")]
    UnsupportedContent(PathBuf),

    #[error("content file {0} is empty")]
    EmptyContent(PathBuf),
}

/// Top-level plan document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub presentation_plan: Vec<SlideEntry>,
}

/// One slide of a plan document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideEntry {
    /// Layout id of the template layout to build the slide from
    #[serde(rename = "objectId")]
    pub object_id: String,
    /// Placeholder type -> index key -> inline markup
    #[serde(default)]
    pub content: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl PlanDocument {
    /// Convert into a plan, optionally keeping an existing plan id.
    ///
    /// Empty fragments are skipped.
    pub fn into_plan(self, plan_id: Option<&str>) -> Result<Plan, PlanFileError> {
        if self.presentation_plan.is_empty() {
            return Err(PlanFileError::Empty);
        }

        let mut slides = Vec::with_capacity(self.presentation_plan.len());
        for (slide, entry) in self.presentation_plan.into_iter().enumerate() {
            let mut spec = SlideSpec::new(entry.object_id);
            for (kind, per_index) in &entry.content {
                for (index, fragment) in per_index {
                    if fragment.trim().is_empty() {
                        continue;
                    }
                    let role = PlaceholderRole::from_parts(kind, index)
                        .map_err(|source| PlanFileError::Role { slide, source })?;
                    spec = spec.with_content(role, fragment.clone());
                }
            }
            if let Some(instructions) = entry.instructions.filter(|i| !i.trim().is_empty()) {
                spec = spec.with_instructions(instructions);
            }
            slides.push(spec);
        }

        Ok(match plan_id {
            Some(id) => Plan::with_id(id, slides),
            None => Plan::new(slides),
        })
    }

    /// Document form of a plan. Adjustment notes are not part of it.
    pub fn from_plan(plan: &Plan) -> Self {
        let presentation_plan = plan
            .slides
            .iter()
            .map(|spec| {
                let mut content: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
                for (role, fragment) in &spec.content {
                    let index = role
                        .index
                        .map_or_else(|| NO_INDEX.to_string(), |i| i.to_string());
                    content
                        .entry(role.kind.as_str().to_string())
                        .or_default()
                        .insert(index, fragment.clone());
                }
                SlideEntry {
                    object_id: spec.layout_id.clone(),
                    content,
                    instructions: spec.instructions.clone(),
                }
            })
            .collect();
        Self { presentation_plan }
    }
}

pub fn plan_from_json(json: &str) -> Result<Plan, PlanFileError> {
    let document: PlanDocument = serde_json::from_str(json)?;
    document.into_plan(None)
}

pub fn plan_to_json(plan: &Plan) -> Result<String, PlanFileError> {
    Ok(serde_json::to_string_pretty(&PlanDocument::from_plan(plan))?)
}

pub fn load_plan_file(path: impl AsRef<Path>) -> Result<Plan, PlanFileError> {
    let path = path.as_ref();
    let json = read(path)?;
    plan_from_json(&json)
}

/// Read raw presentation content for the planner
pub fn load_content_file(path: impl AsRef<Path>) -> Result<String, PlanFileError> {
    let path = path.as_ref();
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| CONTENT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !supported {
        return Err(PlanFileError::UnsupportedContent(path.to_path_buf()));
    }

    let content = read(path)?;
    if content.trim().is_empty() {
        return Err(PlanFileError::EmptyContent(path.to_path_buf()));
    }
    Ok(content)
}

fn read(path: &Path) -> Result<String, PlanFileError> {
    fs::read_to_string(path).map_err(|source| PlanFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_coordination::PlaceholderKind;

    const PLAN: &str = r#"{
        "presentation_plan": [
            {
                "objectId": "layout_title",
                "content": {
                    "CENTERED_TITLE": { "null": "Quarterly <b>review</b>" },
                    "SUBTITLE": { "": "Q3 2026" }
                },
                "instructions": "Opening slide"
            },
            {
                "objectId": "layout_content",
                "content": {
                    "TITLE": { "None": "Numbers" },
                    "BODY": { "1": "<ul><li>Up</li></ul>", "2": "  " }
                },
                "instructions": ""
            }
        ]
    }"#;

    #[test]
    fn test_plan_from_json() {
        let plan = plan_from_json(PLAN).unwrap();
        assert_eq!(plan.len(), 2);

        let first = &plan.slides[0];
        assert_eq!(first.layout_id, "layout_title");
        assert_eq!(
            first.content[&PlaceholderRole::kind(PlaceholderKind::CenteredTitle)],
            "Quarterly <b>review</b>"
        );
        assert!(first
            .content
            .contains_key(&PlaceholderRole::kind(PlaceholderKind::Subtitle)));
        assert_eq!(first.instructions.as_deref(), Some("Opening slide"));

        let second = &plan.slides[1];
        assert_eq!(second.content.len(), 2);
        assert!(second
            .content
            .contains_key(&PlaceholderRole::indexed(PlaceholderKind::Body, 1)));
        assert!(second.instructions.is_none());
    }

    #[test]
    fn test_document_round_trip_keeps_plan_id() {
        let plan = plan_from_json(PLAN).unwrap();
        let document: PlanDocument = serde_json::from_str(&plan_to_json(&plan).unwrap()).unwrap();
        assert_eq!(
            document.presentation_plan[0].content["CENTERED_TITLE"]["null"],
            "Quarterly <b>review</b>"
        );

        let again = document.into_plan(Some(plan.id.as_str())).unwrap();
        assert_eq!(again, plan);
    }

    #[test]
    fn test_bad_index_names_the_slide() {
        let json = r#"{"presentation_plan":[{"objectId":"a","content":{"BODY":{"first":"x"}}}]}"#;
        match plan_from_json(json) {
            Err(PlanFileError::Role { slide: 0, .. }) => {}
            other => panic!("expected role error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(
            plan_from_json(r#"{"presentation_plan":[]}"#),
            Err(PlanFileError::Empty)
        ));
        assert!(matches!(plan_from_json("{}"), Err(PlanFileError::Json(_))));
    }

    #[test]
    fn test_content_file_checks() {
        let dir = tempfile::tempdir().unwrap();

        let notes = dir.path().join("notes.md");
        fs::write(&notes, "# Q3\nRevenue is up").unwrap();
        assert_eq!(load_content_file(&notes).unwrap(), "# Q3\nRevenue is up");

        let blank = dir.path().join("blank.txt");
        fs::write(&blank, "  \n").unwrap();
        assert!(matches!(
            load_content_file(&blank),
            Err(PlanFileError::EmptyContent(_))
        ));

        let pdf = dir.path().join("deck.pdf");
        fs::write(&pdf, "binary").unwrap();
        assert!(matches!(
            load_content_file(&pdf),
            Err(PlanFileError::UnsupportedContent(_))
        ));

        assert!(matches!(
            load_content_file(dir.path().join("missing.txt")),
            Err(PlanFileError::Io { .. })
        ));
    }
}

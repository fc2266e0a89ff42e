//! Conservative local correction of a slide spec against its layout
//!
//! Roles the layout exposes are kept as-is. A role the layout lacks is
//! remapped to the lowest free placeholder of the same kind (titles may move
//! between `TITLE` and `CENTERED_TITLE`), otherwise its content is dropped.
//! Content is never invented.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::SlideSpec;
use crate::template::{PlaceholderKind, PlaceholderRole, TemplateLayout};

/// A single change made while fitting a spec to its layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "correction", rename_all = "snake_case")]
pub enum Correction {
    Remapped {
        from: PlaceholderRole,
        to: PlaceholderRole,
    },
    Dropped {
        role: PlaceholderRole,
        reason: String,
    },
}

impl Correction {
    /// Whether planned content was lost
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Dropped { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Remapped { from, to } => format!("moved {} content to {}", from, to),
            Self::Dropped { role, reason } => format!("dropped {} content ({})", role, reason),
        }
    }
}

/// A spec that fits its layout, plus what had to change to get there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedSpec {
    pub spec: SlideSpec,
    pub corrections: Vec<Correction>,
}

impl CorrectedSpec {
    pub fn is_unchanged(&self) -> bool {
        self.corrections.is_empty()
    }

    pub fn summary(&self) -> Option<String> {
        if self.corrections.is_empty() {
            return None;
        }
        Some(
            self.corrections
                .iter()
                .map(Correction::describe)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Roles in `spec` that `layout` does not expose
pub fn validate(spec: &SlideSpec, layout: &TemplateLayout) -> Vec<PlaceholderRole> {
    spec.content
        .keys()
        .filter(|role| !layout.has_role(role))
        .copied()
        .collect()
}

/// Fit `spec` to `layout`. Pure; the same inputs always yield the same output.
pub fn validate_and_correct(spec: &SlideSpec, layout: &TemplateLayout) -> CorrectedSpec {
    let invalid = validate(spec, layout);
    if invalid.is_empty() {
        return CorrectedSpec {
            spec: spec.clone(),
            corrections: Vec::new(),
        };
    }

    let mut corrected = spec.clone();
    let mut corrections = Vec::new();
    let mut used: BTreeSet<PlaceholderRole> = spec
        .content
        .keys()
        .filter(|role| layout.has_role(role))
        .copied()
        .collect();

    for role in invalid {
        let Some(fragment) = corrected.content.remove(&role) else {
            continue;
        };

        match free_slot(layout, role.kind, &used) {
            Some(target) => {
                used.insert(target);
                corrected.content.insert(target, fragment);
                corrections.push(Correction::Remapped {
                    from: role,
                    to: target,
                });
            }
            None => corrections.push(Correction::Dropped {
                role,
                reason: format!(
                    "layout {} has no free {} placeholder",
                    layout.layout_id, role.kind
                ),
            }),
        }
    }

    CorrectedSpec {
        spec: corrected,
        corrections,
    }
}

fn free_slot(
    layout: &TemplateLayout,
    kind: PlaceholderKind,
    used: &BTreeSet<PlaceholderRole>,
) -> Option<PlaceholderRole> {
    let mut kinds = vec![kind];
    match kind {
        PlaceholderKind::Title => kinds.push(PlaceholderKind::CenteredTitle),
        PlaceholderKind::CenteredTitle => kinds.push(PlaceholderKind::Title),
        _ => {}
    }

    kinds
        .into_iter()
        .flat_map(|k| layout.roles_of_kind(k))
        .find(|candidate| !used.contains(candidate))
}

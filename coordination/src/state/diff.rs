//! Tasklist derivation for an approved plan
//!
//! A task survives a re-approval only if the plan still has a slide at its
//! index whose spec fingerprint matches the one the task was created from
//! (`Task::origin`). Adjustment notes a human merged into the payload later
//! are not part of that comparison, so they survive an unchanged slide.
//! Everything else is discarded and replaced by fresh pending tasks.

use std::collections::HashSet;

use super::types::{Task, TaskId, Tasklist};
use crate::plan::Plan;

/// Outcome of deriving a tasklist
#[derive(Debug, Clone)]
pub struct TasklistDiff {
    pub tasklist: Tasklist,
    /// Prior tasks kept with their identity and status
    pub reused: Vec<TaskId>,
    /// New pending tasks
    pub created: Vec<TaskId>,
    /// Prior tasks with no counterpart in the plan
    pub discarded: Vec<Task>,
}

/// Build the tasklist for `plan`, reusing unchanged tasks from `prior`.
pub fn derive_tasklist(prior: Option<&Tasklist>, plan: &Plan, plan_version: u64) -> TasklistDiff {
    let prior = prior.filter(|p| p.plan_id == plan.id);
    let mut tasklist = Tasklist::new(plan.id.clone(), plan_version);
    let mut reused = Vec::new();
    let mut created = Vec::new();
    let mut kept: HashSet<TaskId> = HashSet::new();

    for (slide_index, spec) in plan.slides.iter().enumerate() {
        let fingerprint = spec.fingerprint();
        let existing = prior
            .and_then(|p| p.by_slide(slide_index))
            .filter(|task| task.origin == fingerprint);

        match existing {
            Some(task) => {
                kept.insert(task.id.clone());
                reused.push(task.id.clone());
                tasklist.insert(task.clone());
            }
            None => {
                let task = Task::new(plan.id.clone(), slide_index, spec.clone());
                created.push(task.id.clone());
                tasklist.insert(task);
            }
        }
    }

    let discarded = prior
        .map(|p| {
            p.tasks()
                .filter(|task| !kept.contains(&task.id))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    TasklistDiff {
        tasklist,
        reused,
        created,
        discarded,
    }
}

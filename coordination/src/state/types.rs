//! Task and tasklist types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::machine::{is_legal_transition, IllegalTransition, TaskStatus, TransitionRecord};
use crate::collaborators::SlideReceipt;
use crate::plan::{Correction, Fingerprint, PlanId, SlideSpec};

/// Unique identifier for a task
pub type TaskId = String;

/// One unit of build work: a single slide of an approved plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub plan_id: PlanId,
    pub slide_index: usize,
    /// Spec the worker builds; human adjustment notes are merged in here
    pub payload: SlideSpec,
    /// Fingerprint of the plan's spec when the task was created
    pub origin: Fingerprint,
    pub status: TaskStatus,
    /// Attempts consumed since creation or the last reset
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SlideReceipt>,
    /// Corrections applied on the latest attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<Correction>,
    /// Set when a human took the slide over; the task is then terminal
    #[serde(default)]
    pub handed_off: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl Task {
    /// Create a pending task for one slide of a plan
    pub fn new(plan_id: impl Into<PlanId>, slide_index: usize, payload: SlideSpec) -> Self {
        let now = Utc::now();
        Self {
            id: format!("task-{}", uuid::Uuid::new_v4().simple()),
            plan_id: plan_id.into(),
            slide_index,
            origin: payload.fingerprint(),
            payload,
            status: TaskStatus::Pending,
            attempts: 0,
            last_failure: None,
            last_explanation: None,
            result: None,
            corrections: Vec::new(),
            handed_off: false,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// Move to `to`, recording the transition.
    pub fn transition(
        &mut self,
        to: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        let from = self.status;
        if !is_legal_transition(from, to) || (self.handed_off && from == TaskStatus::NeedsHuman) {
            return Err(IllegalTransition { from, to });
        }

        let now = Utc::now();
        self.status = to;
        self.updated_at = now;
        self.history.push(TransitionRecord {
            from,
            to,
            attempts: self.attempts,
            reason: reason.map(str::to_string),
            at: now,
        });
        Ok(())
    }

    /// Succeeded, or handed off to a human
    pub fn is_terminal(&self) -> bool {
        self.status == TaskStatus::Succeeded
            || (self.status == TaskStatus::NeedsHuman && self.handed_off)
    }

    /// Waiting for a retry-with-note or hand-off decision
    pub fn awaiting_human(&self) -> bool {
        self.status == TaskStatus::NeedsHuman && !self.handed_off
    }

    /// Actions a human may take on this task right now
    pub fn available_actions(&self) -> Vec<HumanAction> {
        if self.awaiting_human() {
            vec![HumanAction::RetryWithNote, HumanAction::HandOff]
        } else {
            Vec::new()
        }
    }
}

/// What a human may do with a task that needs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanAction {
    RetryWithNote,
    HandOff,
}

/// All tasks of one plan, keyed by task id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tasklist {
    pub plan_id: PlanId,
    /// Approval cycle that produced this tasklist
    pub plan_version: u64,
    tasks: BTreeMap<TaskId, Task>,
}

impl Tasklist {
    pub fn new(plan_id: impl Into<PlanId>, plan_version: u64) -> Self {
        Self {
            plan_id: plan_id.into(),
            plan_version,
            tasks: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn remove(&mut self, task_id: &str) -> Option<Task> {
        self.tasks.remove(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn by_slide(&self, slide_index: usize) -> Option<&Task> {
        self.tasks.values().find(|t| t.slide_index == slide_index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks in slide order
    pub fn ordered(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.slide_index);
        tasks
    }

    pub fn slide_indices(&self) -> Vec<usize> {
        self.ordered().into_iter().map(|t| t.slide_index).collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InFlight => counts.in_flight += 1,
                TaskStatus::Succeeded => counts.succeeded += 1,
                TaskStatus::Retrying => counts.retrying += 1,
                TaskStatus::NeedsHuman if task.handed_off => counts.handed_off += 1,
                TaskStatus::NeedsHuman => counts.needs_human += 1,
            }
        }
        counts
    }

    /// No task is pending, in flight or retrying
    pub fn is_settled(&self) -> bool {
        self.counts().active() == 0
    }

    pub fn view(&self) -> TasklistView {
        TasklistView {
            plan_id: self.plan_id.clone(),
            plan_version: self.plan_version,
            counts: self.counts(),
            tasks: self
                .ordered()
                .into_iter()
                .map(|task| TaskViewEntry {
                    task_id: task.id.clone(),
                    slide_index: task.slide_index,
                    layout_id: task.payload.layout_id.clone(),
                    status: task.status,
                    attempts: task.attempts,
                    last_explanation: task.last_explanation.clone(),
                    last_failure: task.last_failure.clone(),
                    corrections: task.corrections.iter().map(Correction::describe).collect(),
                    handed_off: task.handed_off,
                    actions: task.available_actions(),
                })
                .collect(),
        }
    }
}

/// Number of tasks per status. Handed-off tasks are counted apart from
/// `needs_human`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub retrying: usize,
    pub needs_human: usize,
    pub handed_off: usize,
}

impl StatusCounts {
    /// Tasks that still have work queued or running
    pub fn active(&self) -> usize {
        self.pending + self.in_flight + self.retrying
    }

    pub fn total(&self) -> usize {
        self.active() + self.succeeded + self.needs_human + self.handed_off
    }
}

/// Read-only view of a tasklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasklistView {
    pub plan_id: PlanId,
    pub plan_version: u64,
    pub counts: StatusCounts,
    pub tasks: Vec<TaskViewEntry>,
}

impl TasklistView {
    pub fn task(&self, task_id: &str) -> Option<&TaskViewEntry> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn awaiting_human(&self) -> impl Iterator<Item = &TaskViewEntry> {
        self.tasks.iter().filter(|t| !t.actions.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskViewEntry {
    pub task_id: TaskId,
    pub slide_index: usize,
    pub layout_id: String,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<String>,
    pub handed_off: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<HumanAction>,
}

//! Outcome reports emitted by workers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::TaskId;
use crate::collaborators::SlideReceipt;
use crate::plan::{Correction, PlanId};

/// Result of one execution attempt of one task.
///
/// `(task_id, attempt)` identifies a report; the reconciler applies each
/// identity at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub task_id: TaskId,
    pub plan_id: PlanId,
    /// 1-based attempt number
    pub attempt: u32,
    pub success: bool,
    /// Failure that must not be retried
    #[serde(default)]
    pub fatal: bool,
    /// Natural-language explanation of what happened
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SlideReceipt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<Correction>,
    /// Worker that ran the attempt
    pub worker: String,
    pub reported_at: DateTime<Utc>,
}

impl OutcomeReport {
    pub fn succeeded(
        task_id: impl Into<TaskId>,
        plan_id: impl Into<PlanId>,
        attempt: u32,
        explanation: impl Into<String>,
        result: SlideReceipt,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            plan_id: plan_id.into(),
            attempt,
            success: true,
            fatal: false,
            explanation: explanation.into(),
            result: Some(result),
            corrections: Vec::new(),
            worker: String::new(),
            reported_at: Utc::now(),
        }
    }

    pub fn failed(
        task_id: impl Into<TaskId>,
        plan_id: impl Into<PlanId>,
        attempt: u32,
        fatal: bool,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            plan_id: plan_id.into(),
            attempt,
            success: false,
            fatal,
            explanation: explanation.into(),
            result: None,
            corrections: Vec::new(),
            worker: String::new(),
            reported_at: Utc::now(),
        }
    }

    pub fn with_corrections(mut self, corrections: Vec<Correction>) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = worker.into();
        self
    }
}

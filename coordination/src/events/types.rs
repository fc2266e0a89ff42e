//! Pipeline event types
//!
//! Published by the orchestrator on every plan and task change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::PlanId;
use crate::state::{StatusCounts, TaskId};

/// All build pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A draft plan was stored (new or revised)
    PlanDrafted {
        plan_id: PlanId,
        slides: usize,
        revision: u32,
        timestamp: DateTime<Utc>,
    },

    /// A plan was approved and its tasklist derived
    PlanApproved {
        plan_id: PlanId,
        version: u64,
        reused: usize,
        created: usize,
        discarded: usize,
        timestamp: DateTime<Utc>,
    },

    /// A task entered the queue
    TaskQueued {
        task_id: TaskId,
        plan_id: PlanId,
        slide_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// A worker began an attempt
    TaskStarted {
        task_id: TaskId,
        plan_id: PlanId,
        attempt: u32,
        worker: String,
        timestamp: DateTime<Utc>,
    },

    TaskSucceeded {
        task_id: TaskId,
        plan_id: PlanId,
        attempt: u32,
        explanation: String,
        timestamp: DateTime<Utc>,
    },

    /// An attempt failed and the task went back to the queue
    TaskRetrying {
        task_id: TaskId,
        plan_id: PlanId,
        attempt: u32,
        explanation: String,
        timestamp: DateTime<Utc>,
    },

    /// Attempts exhausted or a fatal error; a human must decide
    TaskNeedsHuman {
        task_id: TaskId,
        plan_id: PlanId,
        attempts: u32,
        explanation: String,
        timestamp: DateTime<Utc>,
    },

    /// A human retried the task with a note
    TaskReset {
        task_id: TaskId,
        plan_id: PlanId,
        note: String,
        timestamp: DateTime<Utc>,
    },

    TaskHandedOff {
        task_id: TaskId,
        plan_id: PlanId,
        timestamp: DateTime<Utc>,
    },

    /// The task's slide changed or disappeared in a re-approved plan
    TaskCancelled {
        task_id: TaskId,
        plan_id: PlanId,
        timestamp: DateTime<Utc>,
    },

    /// A worker message was ignored (duplicate, stale or unknown task)
    ReportDiscarded {
        task_id: TaskId,
        plan_id: PlanId,
        attempt: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The tasklist view was re-rendered
    TasklistUpdated {
        plan_id: PlanId,
        version: u64,
        counts: StatusCounts,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PlanDrafted { .. } => "plan_drafted",
            Self::PlanApproved { .. } => "plan_approved",
            Self::TaskQueued { .. } => "task_queued",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskSucceeded { .. } => "task_succeeded",
            Self::TaskRetrying { .. } => "task_retrying",
            Self::TaskNeedsHuman { .. } => "task_needs_human",
            Self::TaskReset { .. } => "task_reset",
            Self::TaskHandedOff { .. } => "task_handed_off",
            Self::TaskCancelled { .. } => "task_cancelled",
            Self::ReportDiscarded { .. } => "report_discarded",
            Self::TasklistUpdated { .. } => "tasklist_updated",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PlanDrafted { timestamp, .. }
            | Self::PlanApproved { timestamp, .. }
            | Self::TaskQueued { timestamp, .. }
            | Self::TaskStarted { timestamp, .. }
            | Self::TaskSucceeded { timestamp, .. }
            | Self::TaskRetrying { timestamp, .. }
            | Self::TaskNeedsHuman { timestamp, .. }
            | Self::TaskReset { timestamp, .. }
            | Self::TaskHandedOff { timestamp, .. }
            | Self::TaskCancelled { timestamp, .. }
            | Self::ReportDiscarded { timestamp, .. }
            | Self::TasklistUpdated { timestamp, .. } => *timestamp,
        }
    }

    pub fn plan_id(&self) -> &str {
        match self {
            Self::PlanDrafted { plan_id, .. }
            | Self::PlanApproved { plan_id, .. }
            | Self::TaskQueued { plan_id, .. }
            | Self::TaskStarted { plan_id, .. }
            | Self::TaskSucceeded { plan_id, .. }
            | Self::TaskRetrying { plan_id, .. }
            | Self::TaskNeedsHuman { plan_id, .. }
            | Self::TaskReset { plan_id, .. }
            | Self::TaskHandedOff { plan_id, .. }
            | Self::TaskCancelled { plan_id, .. }
            | Self::ReportDiscarded { plan_id, .. }
            | Self::TasklistUpdated { plan_id, .. } => plan_id,
        }
    }

    /// Task the event is about, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskQueued { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskSucceeded { task_id, .. }
            | Self::TaskRetrying { task_id, .. }
            | Self::TaskNeedsHuman { task_id, .. }
            | Self::TaskReset { task_id, .. }
            | Self::TaskHandedOff { task_id, .. }
            | Self::TaskCancelled { task_id, .. }
            | Self::ReportDiscarded { task_id, .. } => Some(task_id),
            Self::PlanDrafted { .. } | Self::PlanApproved { .. } | Self::TasklistUpdated { .. } => {
                None
            }
        }
    }
}

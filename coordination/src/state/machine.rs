//! Task state machine: explicit statuses and legal transition guards.
//!
//! ```text
//! Pending → InFlight
//! InFlight → Succeeded | Retrying | NeedsHuman
//! Retrying → Pending | NeedsHuman
//! NeedsHuman → Pending      (explicit reset; not once handed off)
//! ```
//!
//! `Succeeded` has no outgoing edges.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a build task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue
    Pending,
    /// Held by a worker
    InFlight,
    /// Slide built
    Succeeded,
    /// Last attempt failed; about to be re-queued or escalated
    Retrying,
    /// Needs a retry-with-note or hand-off from a human
    NeedsHuman,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Retrying => write!(f, "retrying"),
            Self::NeedsHuman => write!(f, "needs_human"),
        }
    }
}

/// Whether `from → to` is an edge of the task state graph
pub fn is_legal_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;

    matches!(
        (from, to),
        (Pending, InFlight)
            | (InFlight, Succeeded)
            | (InFlight, Retrying)
            | (InFlight, NeedsHuman)
            | (Retrying, Pending)
            | (Retrying, NeedsHuman)
            | (NeedsHuman, Pending)
    )
}

/// A single recorded status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TaskStatus,
    pub to: TaskStatus,
    /// Attempt count after the transition
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal task transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::*;

    const ALL: [TaskStatus; 5] = [Pending, InFlight, Succeeded, Retrying, NeedsHuman];

    #[test]
    fn test_nothing_leaves_succeeded() {
        for to in ALL {
            assert!(!is_legal_transition(Succeeded, to), "succeeded → {}", to);
        }
    }

    #[test]
    fn test_pending_only_reaches_in_flight() {
        for to in ALL {
            assert_eq!(is_legal_transition(Pending, to), to == InFlight);
        }
    }

    #[test]
    fn test_retry_edges() {
        assert!(is_legal_transition(InFlight, Retrying));
        assert!(is_legal_transition(Retrying, Pending));
        assert!(is_legal_transition(Retrying, NeedsHuman));
        assert!(is_legal_transition(NeedsHuman, Pending));
        assert!(!is_legal_transition(Retrying, InFlight));
        assert!(!is_legal_transition(NeedsHuman, InFlight));
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = IllegalTransition {
            from: Pending,
            to: Succeeded,
        };
        assert_eq!(err.to_string(), "Illegal task transition: pending → succeeded");
    }
}

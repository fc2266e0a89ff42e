//! Feedback reconciler
//!
//! Folds worker messages and human directives into the tasklist. Pure: it
//! takes a tasklist snapshot and an input and returns the next tasklist plus
//! what the orchestrator has to do about it (re-enqueue, surface to a human).
//! It never touches the queue, the store or the event bus.
//!
//! A report is identified by `(task_id, attempt)`. A report whose attempt is
//! already reflected in the task's attempt count is a duplicate and leaves the
//! tasklist unchanged.

use serde::{Deserialize, Serialize};

use crate::config::MAX_ATTEMPTS;
use crate::state::{IllegalTransition, OutcomeReport, Task, TaskId, TaskStatus, Tasklist};

/// A decision from the human reviewing a task that needs them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum HumanDirective {
    /// Reset attempts and re-queue with the note merged into the slide spec
    RetryWithNote { note: String },
    /// Leave the slide to the human permanently
    HandOff,
}

/// Something to fold into the tasklist
#[derive(Debug, Clone)]
pub enum ReconcileInput {
    /// A worker began an attempt
    Started { task_id: TaskId, attempt: u32 },
    Outcome(OutcomeReport),
    Human {
        task_id: TaskId,
        directive: HumanDirective,
    },
    /// The process stopped while the task was in flight
    Interrupted { task_id: TaskId },
}

/// What changed, and what the caller must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Started { task_id: TaskId, attempt: u32 },
    Succeeded { task_id: TaskId, attempt: u32 },
    /// Failed with attempts remaining; enqueue this task again
    Requeued(Task),
    /// Ceiling reached or fatal error
    NeedsHuman { task_id: TaskId, explanation: String },
    /// Human retry; enqueue this task again
    Reset(Task),
    HandedOff { task_id: TaskId },
    /// Interrupted attempt rolled back; enqueue this task again
    Resumed(Task),
}

impl ReconcileOutcome {
    /// Task the caller must put back in the queue, if any
    pub fn task_to_enqueue(&self) -> Option<&Task> {
        match self {
            Self::Requeued(task) | Self::Reset(task) | Self::Resumed(task) => Some(task),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub tasklist: Tasklist,
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("duplicate report for task {task_id} attempt {attempt}")]
    DuplicateReport { task_id: TaskId, attempt: u32 },

    #[error("stale message for task {task_id} attempt {attempt} (task is {status})")]
    StaleReport {
        task_id: TaskId,
        attempt: u32,
        status: TaskStatus,
    },

    #[error("task {task_id} attempt {attempt} exceeds the retry ceiling of {ceiling}")]
    CeilingExceeded {
        task_id: TaskId,
        attempt: u32,
        ceiling: u32,
    },

    #[error("task {task_id} is {status}; human directives apply only to tasks needing a human")]
    DirectiveNotApplicable { task_id: TaskId, status: TaskStatus },

    #[error("{0}")]
    Transition(#[from] IllegalTransition),
}

impl ReconcileError {
    /// Errors that mean "ignore this message" rather than a caller mistake
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTask(_)
                | Self::DuplicateReport { .. }
                | Self::StaleReport { .. }
                | Self::CeilingExceeded { .. }
        )
    }
}

/// Result type for reconciler operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Clone, Copy)]
pub struct FeedbackReconciler {
    retry_ceiling: u32,
}

impl Default for FeedbackReconciler {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

impl FeedbackReconciler {
    /// `retry_ceiling` is clamped to `1..=MAX_ATTEMPTS`
    pub fn new(retry_ceiling: u32) -> Self {
        Self {
            retry_ceiling: retry_ceiling.clamp(1, MAX_ATTEMPTS),
        }
    }

    pub fn retry_ceiling(&self) -> u32 {
        self.retry_ceiling
    }

    pub fn reconcile(
        &self,
        tasklist: &Tasklist,
        input: ReconcileInput,
    ) -> ReconcileResult<Reconciliation> {
        let mut next = tasklist.clone();
        let outcome = match input {
            ReconcileInput::Started { task_id, attempt } => {
                self.apply_started(&mut next, task_id, attempt)?
            }
            ReconcileInput::Outcome(report) => self.apply_report(&mut next, report)?,
            ReconcileInput::Human { task_id, directive } => {
                apply_directive(&mut next, task_id, directive)?
            }
            ReconcileInput::Interrupted { task_id } => apply_interrupted(&mut next, task_id)?,
        };
        Ok(Reconciliation {
            tasklist: next,
            outcome,
        })
    }

    fn apply_started(
        &self,
        tasklist: &mut Tasklist,
        task_id: TaskId,
        attempt: u32,
    ) -> ReconcileResult<ReconcileOutcome> {
        let task = tasklist
            .get_mut(&task_id)
            .ok_or_else(|| ReconcileError::UnknownTask(task_id.clone()))?;

        if attempt > self.retry_ceiling {
            return Err(ReconcileError::CeilingExceeded {
                task_id,
                attempt,
                ceiling: self.retry_ceiling,
            });
        }
        if attempt <= task.attempts
            || (task.status == TaskStatus::InFlight && attempt == task.attempts + 1)
        {
            return Err(ReconcileError::DuplicateReport { task_id, attempt });
        }
        if task.status != TaskStatus::Pending || attempt != task.attempts + 1 {
            return Err(ReconcileError::StaleReport {
                task_id,
                attempt,
                status: task.status,
            });
        }

        task.transition(TaskStatus::InFlight, Some(&format!("attempt {} started", attempt)))?;
        Ok(ReconcileOutcome::Started { task_id, attempt })
    }

    fn apply_report(
        &self,
        tasklist: &mut Tasklist,
        report: OutcomeReport,
    ) -> ReconcileResult<ReconcileOutcome> {
        let task_id = report.task_id.clone();
        let attempt = report.attempt;
        let task = tasklist
            .get_mut(&task_id)
            .ok_or_else(|| ReconcileError::UnknownTask(task_id.clone()))?;

        if attempt == 0 || attempt > self.retry_ceiling {
            return Err(ReconcileError::CeilingExceeded {
                task_id,
                attempt,
                ceiling: self.retry_ceiling,
            });
        }
        if attempt <= task.attempts {
            return Err(ReconcileError::DuplicateReport { task_id, attempt });
        }
        if task.status != TaskStatus::InFlight || attempt != task.attempts + 1 {
            return Err(ReconcileError::StaleReport {
                task_id,
                attempt,
                status: task.status,
            });
        }

        task.attempts = attempt;
        task.last_explanation = Some(report.explanation.clone());
        task.corrections = report.corrections;

        if report.success {
            task.result = report.result;
            task.last_failure = None;
            task.transition(TaskStatus::Succeeded, None)?;
            return Ok(ReconcileOutcome::Succeeded { task_id, attempt });
        }

        task.last_failure = Some(report.explanation.clone());
        if report.fatal {
            task.transition(TaskStatus::NeedsHuman, Some("fatal tool error"))?;
            return Ok(ReconcileOutcome::NeedsHuman {
                task_id,
                explanation: report.explanation,
            });
        }

        task.transition(TaskStatus::Retrying, Some("recoverable failure"))?;
        if task.attempts < self.retry_ceiling {
            task.transition(TaskStatus::Pending, Some("re-queued"))?;
            Ok(ReconcileOutcome::Requeued(task.clone()))
        } else {
            task.transition(TaskStatus::NeedsHuman, Some("retry ceiling reached"))?;
            Ok(ReconcileOutcome::NeedsHuman {
                task_id,
                explanation: report.explanation,
            })
        }
    }
}

fn apply_directive(
    tasklist: &mut Tasklist,
    task_id: TaskId,
    directive: HumanDirective,
) -> ReconcileResult<ReconcileOutcome> {
    let task = tasklist
        .get_mut(&task_id)
        .ok_or_else(|| ReconcileError::UnknownTask(task_id.clone()))?;

    if !task.awaiting_human() {
        return Err(ReconcileError::DirectiveNotApplicable {
            task_id,
            status: task.status,
        });
    }

    match directive {
        HumanDirective::RetryWithNote { note } => {
            task.payload = task.payload.clone().with_adjustment(note);
            task.attempts = 0;
            task.last_failure = None;
            task.transition(TaskStatus::Pending, Some("human retry with note"))?;
            Ok(ReconcileOutcome::Reset(task.clone()))
        }
        HumanDirective::HandOff => {
            task.handed_off = true;
            task.updated_at = chrono::Utc::now();
            Ok(ReconcileOutcome::HandedOff { task_id })
        }
    }
}

fn apply_interrupted(tasklist: &mut Tasklist, task_id: TaskId) -> ReconcileResult<ReconcileOutcome> {
    let task = tasklist
        .get_mut(&task_id)
        .ok_or_else(|| ReconcileError::UnknownTask(task_id.clone()))?;

    if task.status != TaskStatus::InFlight {
        return Err(ReconcileError::StaleReport {
            task_id,
            attempt: task.attempts + 1,
            status: task.status,
        });
    }

    task.transition(TaskStatus::Retrying, Some("interrupted"))?;
    task.transition(TaskStatus::Pending, Some("resumed"))?;
    Ok(ReconcileOutcome::Resumed(task.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SlideReceipt;
    use crate::plan::SlideSpec;

    fn setup() -> (Tasklist, TaskId) {
        let mut list = Tasklist::new("plan-1", 1);
        let task = Task::new("plan-1", 0, SlideSpec::new("layout_a"));
        let id = task.id.clone();
        list.insert(task);
        (list, id)
    }

    fn start(r: &FeedbackReconciler, list: &Tasklist, id: &str, attempt: u32) -> Tasklist {
        r.reconcile(
            list,
            ReconcileInput::Started {
                task_id: id.to_string(),
                attempt,
            },
        )
        .unwrap()
        .tasklist
    }

    fn failure(id: &str, attempt: u32) -> ReconcileInput {
        ReconcileInput::Outcome(OutcomeReport::failed(
            id,
            "plan-1",
            attempt,
            false,
            format!("failure #{}", attempt),
        ))
    }

    fn success(id: &str, attempt: u32) -> ReconcileInput {
        ReconcileInput::Outcome(OutcomeReport::succeeded(
            id,
            "plan-1",
            attempt,
            "built",
            SlideReceipt {
                slide_object_id: "deck_plan1_0".to_string(),
                revision: None,
            },
        ))
    }

    #[test]
    fn test_success_marks_succeeded_with_result() {
        let r = FeedbackReconciler::default();
        let (list, id) = setup();
        let list = start(&r, &list, &id, 1);

        let rec = r.reconcile(&list, success(&id, 1)).unwrap();
        let task = rec.tasklist.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.attempts, 1);
        assert!(task.result.is_some());
        assert_eq!(rec.outcome, ReconcileOutcome::Succeeded { task_id: id, attempt: 1 });
    }

    #[test]
    fn test_failures_requeue_until_ceiling() {
        let r = FeedbackReconciler::default();
        let (mut list, id) = setup();

        for attempt in 1..=4 {
            list = start(&r, &list, &id, attempt);
            let rec = r.reconcile(&list, failure(&id, attempt)).unwrap();
            assert!(matches!(rec.outcome, ReconcileOutcome::Requeued(ref t) if t.attempts == attempt));
            list = rec.tasklist;
            assert_eq!(list.get(&id).unwrap().status, TaskStatus::Pending);
        }

        list = start(&r, &list, &id, 5);
        let rec = r.reconcile(&list, failure(&id, 5)).unwrap();
        let task = rec.tasklist.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::NeedsHuman);
        assert_eq!(task.attempts, 5);
        assert_eq!(task.last_failure.as_deref(), Some("failure #5"));
        assert_eq!(task.available_actions().len(), 2);
    }

    #[test]
    fn test_duplicate_report_leaves_tasklist_unchanged() {
        let r = FeedbackReconciler::default();
        let (list, id) = setup();
        let list = start(&r, &list, &id, 1);
        let list = r.reconcile(&list, failure(&id, 1)).unwrap().tasklist;

        let err = r.reconcile(&list, failure(&id, 1)).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::DuplicateReport {
                task_id: id.clone(),
                attempt: 1
            }
        );
        assert!(err.is_discardable());

        let err = r.reconcile(&list, success(&id, 1)).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateReport { .. }));
    }

    #[test]
    fn test_fatal_goes_straight_to_needs_human() {
        let r = FeedbackReconciler::default();
        let (list, id) = setup();
        let list = start(&r, &list, &id, 1);

        let report = OutcomeReport::failed(id.as_str(), "plan-1", 1, true, "slide deleted");
        let rec = r.reconcile(&list, ReconcileInput::Outcome(report)).unwrap();
        let task = rec.tasklist.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::NeedsHuman);
        assert_eq!(task.attempts, 1);
        assert!(!task.history.iter().any(|t| t.to == TaskStatus::Retrying));
    }

    #[test]
    fn test_report_without_start_is_stale() {
        let r = FeedbackReconciler::default();
        let (list, id) = setup();
        let err = r.reconcile(&list, success(&id, 1)).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::StaleReport {
                status: TaskStatus::Pending,
                ..
            }
        ));
    }

    #[test]
    fn test_attempt_above_ceiling_rejected() {
        let r = FeedbackReconciler::new(2);
        let (list, id) = setup();
        let err = r
            .reconcile(
                &list,
                ReconcileInput::Started {
                    task_id: id.clone(),
                    attempt: 3,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ReconcileError::CeilingExceeded { ceiling: 2, .. }));
    }

    #[test]
    fn test_retry_with_note_resets() {
        let r = FeedbackReconciler::new(1);
        let (list, id) = setup();
        let list = start(&r, &list, &id, 1);
        let list = r.reconcile(&list, failure(&id, 1)).unwrap().tasklist;
        assert_eq!(list.get(&id).unwrap().status, TaskStatus::NeedsHuman);

        let rec = r
            .reconcile(
                &list,
                ReconcileInput::Human {
                    task_id: id.clone(),
                    directive: HumanDirective::RetryWithNote {
                        note: "use two bullets".to_string(),
                    },
                },
            )
            .unwrap();
        let task = rec.tasklist.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.payload.adjustments, vec!["use two bullets".to_string()]);
        assert!(matches!(rec.outcome, ReconcileOutcome::Reset(_)));
        assert!(rec.outcome.task_to_enqueue().is_some());
    }

    #[test]
    fn test_hand_off_is_terminal() {
        let r = FeedbackReconciler::new(1);
        let (list, id) = setup();
        let list = start(&r, &list, &id, 1);
        let list = r.reconcile(&list, failure(&id, 1)).unwrap().tasklist;

        let hand_off = |list: &Tasklist| {
            r.reconcile(
                list,
                ReconcileInput::Human {
                    task_id: id.clone(),
                    directive: HumanDirective::HandOff,
                },
            )
        };
        let list = hand_off(&list).unwrap().tasklist;
        assert!(list.get(&id).unwrap().is_terminal());
        assert!(matches!(
            hand_off(&list),
            Err(ReconcileError::DirectiveNotApplicable { .. })
        ));
    }

    #[test]
    fn test_directive_on_pending_task_rejected() {
        let r = FeedbackReconciler::default();
        let (list, id) = setup();
        let err = r
            .reconcile(
                &list,
                ReconcileInput::Human {
                    task_id: id,
                    directive: HumanDirective::HandOff,
                },
            )
            .unwrap_err();
        assert!(!err.is_discardable());
    }

    #[test]
    fn test_interrupted_keeps_attempts() {
        let r = FeedbackReconciler::default();
        let (list, id) = setup();
        let list = start(&r, &list, &id, 1);

        let rec = r
            .reconcile(&list, ReconcileInput::Interrupted { task_id: id.clone() })
            .unwrap();
        let task = rec.tasklist.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(matches!(rec.outcome, ReconcileOutcome::Resumed(_)));
    }

    #[test]
    fn test_attempts_never_exceed_ceiling() {
        let r = FeedbackReconciler::default();
        let (mut list, id) = setup();
        for attempt in 1..=8 {
            if let Ok(rec) = r.reconcile(
                &list,
                ReconcileInput::Started {
                    task_id: id.clone(),
                    attempt,
                },
            ) {
                list = rec.tasklist;
            }
            if let Ok(rec) = r.reconcile(&list, failure(&id, attempt)) {
                list = rec.tasklist;
            }
            assert!(list.get(&id).unwrap().attempts <= MAX_ATTEMPTS);
        }
        assert_eq!(list.get(&id).unwrap().status, TaskStatus::NeedsHuman);
    }
}

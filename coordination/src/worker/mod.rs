//! Worker: runs one attempt of one task at a time
//!
//! Per lease:
//!
//! 1. fit the slide spec to its layout (pure correction, never a failure)
//! 2. build the slide's tool-call batch
//! 3. apply it through the slide tool under a timeout
//! 4. release the lease and emit exactly one outcome report
//!
//! Workers never touch the tasklist. A failed attempt is retried by the
//! reconciler putting the task back in the queue, which keeps the attempts of
//! one task strictly sequential.

pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collaborators::{SharedSlideTool, ToolError};
use crate::plan::{validate_and_correct, PlanId};
use crate::queue::{Lease, SharedTaskQueue};
use crate::slides::build_slide_batch;
use crate::state::{OutcomeReport, TaskId};
use crate::template::LayoutCatalog;

pub use pool::WorkerPool;

/// What a worker tells the orchestrator
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// An attempt began; the task is now in flight
    Started {
        task_id: TaskId,
        plan_id: PlanId,
        attempt: u32,
        worker: String,
    },
    /// An attempt finished
    Outcome(OutcomeReport),
}

/// Settings shared by every worker of a pool
#[derive(Clone)]
pub struct WorkerSettings {
    pub catalog: Arc<LayoutCatalog>,
    pub tool: SharedSlideTool,
    pub tool_timeout: Duration,
}

pub struct Worker {
    name: String,
    queue: SharedTaskQueue,
    settings: WorkerSettings,
    messages: mpsc::UnboundedSender<WorkerMessage>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        queue: SharedTaskQueue,
        settings: WorkerSettings,
        messages: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            settings,
            messages,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pull leases until the queue closes.
    pub async fn run(self) {
        info!(worker = %self.name, "Worker started");
        while let Some(lease) = self.queue.next_lease().await {
            self.process(lease).await;
        }
        info!(worker = %self.name, "Worker stopped");
    }

    async fn process(&self, lease: Lease) {
        if lease.is_cancelled() {
            self.queue.release(&lease);
            return;
        }

        let started = WorkerMessage::Started {
            task_id: lease.task.id.clone(),
            plan_id: lease.task.plan_id.clone(),
            attempt: lease.attempt,
            worker: self.name.clone(),
        };
        if self.messages.send(started).is_err() {
            warn!(worker = %self.name, "Orchestrator gone, dropping lease");
            self.queue.release(&lease);
            return;
        }

        let report = self.attempt(&lease).await;
        self.queue.release(&lease);

        if lease.is_cancelled() {
            debug!(
                worker = %self.name,
                task_id = %lease.task.id,
                attempt = lease.attempt,
                "Task cancelled during attempt, report suppressed"
            );
            return;
        }

        if self.messages.send(WorkerMessage::Outcome(report)).is_err() {
            warn!(worker = %self.name, task_id = %lease.task.id, "Orchestrator gone, report lost");
        }
    }

    /// Run one attempt and describe it. Never panics, never retries.
    pub async fn attempt(&self, lease: &Lease) -> OutcomeReport {
        let task = &lease.task;
        let slide = task.slide_index + 1;

        let Some(layout) = self.settings.catalog.get(&task.payload.layout_id) else {
            return OutcomeReport::failed(
                &task.id,
                &task.plan_id,
                lease.attempt,
                true,
                format!(
                    "Slide {} uses layout '{}', which the template does not have",
                    slide, task.payload.layout_id
                ),
            )
            .with_worker(&self.name);
        };

        let corrected = validate_and_correct(&task.payload, layout);
        if let Some(summary) = corrected.summary() {
            info!(task_id = %task.id, slide, corrections = %summary, "Slide spec corrected");
        }
        let batch = build_slide_batch(&task.plan_id, task.slide_index, &corrected.spec, layout);

        debug!(
            worker = %self.name,
            task_id = %task.id,
            attempt = lease.attempt,
            calls = batch.len(),
            "Applying slide batch"
        );

        let timeout = self.settings.tool_timeout;
        let report = match tokio::time::timeout(timeout, self.settings.tool.apply(&batch)).await {
            Ok(Ok(receipt)) => {
                let mut explanation = format!(
                    "Built slide {} from layout '{}' with {} tool calls",
                    slide,
                    layout.layout_id,
                    batch.len()
                );
                if let Some(summary) = corrected.summary() {
                    explanation.push_str(&format!("; {}", summary));
                }
                OutcomeReport::succeeded(&task.id, &task.plan_id, lease.attempt, explanation, receipt)
            }
            Ok(Err(err @ ToolError::Recoverable(_))) => OutcomeReport::failed(
                &task.id,
                &task.plan_id,
                lease.attempt,
                false,
                format!("Attempt {} on slide {} failed: {}", lease.attempt, slide, err.message()),
            ),
            Ok(Err(err @ ToolError::Fatal(_))) => OutcomeReport::failed(
                &task.id,
                &task.plan_id,
                lease.attempt,
                true,
                format!(
                    "Slide {} cannot be built: {}",
                    slide,
                    err.message()
                ),
            ),
            Err(_) => OutcomeReport::failed(
                &task.id,
                &task.plan_id,
                lease.attempt,
                false,
                format!(
                    "Attempt {} on slide {} timed out after {}s",
                    lease.attempt,
                    slide,
                    timeout.as_secs_f32()
                ),
            ),
        };

        report
            .with_corrections(corrected.corrections)
            .with_worker(&self.name)
    }
}

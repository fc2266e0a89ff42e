//! Orchestrator: plan lifecycle and the single writer of every tasklist
//!
//! ```text
//!  draft ──approve──▶ derive tasklist ──enqueue──▶ TaskQueue ──▶ WorkerPool
//!    ▲                                                              │
//!    └── revise (planner)        tasklist ◀── reconciler ◀── WorkerMessage
//!                                    ▲
//!                                    └──── human directive
//! ```
//!
//! All tasklist mutations go through one async mutex, are computed by the
//! pure [`FeedbackReconciler`], cached as immutable snapshots and flushed to
//! the store. Readers only ever see whole snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::collaborators::{PlanningError, SharedPlanner, SharedSlideTool};
use crate::config::{ConfigError, PipelineConfig};
use crate::events::{EventBus, PipelineEvent, SharedEventBus};
use crate::plan::{Plan, PlanError, PlanId, SlideSpec};
use crate::queue::{QueueError, SharedTaskQueue, TaskQueue};
use crate::reconciler::{
    FeedbackReconciler, HumanDirective, ReconcileError, ReconcileInput, ReconcileOutcome,
};
use crate::state::{
    derive_tasklist, OutcomeReport, SharedTasklistStore, StoreError, Task, TaskId, TaskStatus,
    Tasklist, TasklistView,
};
use crate::template::LayoutCatalog;
use crate::worker::{WorkerMessage, WorkerPool, WorkerSettings};

/// Error type for orchestrator operations
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown plan: {0}")]
    UnknownPlan(PlanId),

    #[error("Plan {0} has no draft awaiting approval")]
    NoDraft(PlanId),

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),
}

/// Result type for orchestrator operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Shared reference to Orchestrator
pub type SharedOrchestrator = Arc<Orchestrator>;

/// Draft and approved versions of one plan
#[derive(Debug, Clone, Default)]
pub struct PlanRecord {
    pub draft: Option<Plan>,
    pub approved: Option<Plan>,
    /// Number of approvals so far
    pub version: u64,
    /// Number of planner revisions of the draft
    pub revisions: u32,
}

/// What an approval did to the tasklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSummary {
    pub plan_id: PlanId,
    pub version: u64,
    pub reused: Vec<TaskId>,
    pub created: Vec<TaskId>,
    pub discarded: Vec<TaskId>,
    pub enqueued: usize,
}

/// Running worker pool plus the task feeding its messages back
pub struct PipelineHandle {
    pool: WorkerPool,
    feedback: JoinHandle<()>,
}

impl PipelineHandle {
    /// Stop handing out tasks, let running attempts finish and drain their
    /// reports into the tasklist.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
        if let Err(e) = self.feedback.await {
            warn!(error = %e, "feedback loop panicked");
        }
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    catalog: Arc<LayoutCatalog>,
    planner: SharedPlanner,
    store: SharedTasklistStore,
    queue: SharedTaskQueue,
    events: SharedEventBus,
    reconciler: FeedbackReconciler,
    plans: RwLock<HashMap<PlanId, PlanRecord>>,
    tasklists: RwLock<HashMap<PlanId, Arc<Tasklist>>>,
    /// Held for every tasklist write
    writer: Mutex<()>,
}

impl Orchestrator {
    /// Fails on a config that [`PipelineConfig::validated`] rejects.
    pub fn new(
        config: PipelineConfig,
        catalog: LayoutCatalog,
        planner: SharedPlanner,
        store: SharedTasklistStore,
    ) -> PipelineResult<Self> {
        let config = config.validated()?;
        let reconciler = FeedbackReconciler::new(config.retry_ceiling);
        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            planner,
            store,
            queue: TaskQueue::new().shared(),
            events: EventBus::new().shared(),
            reconciler,
            plans: RwLock::new(HashMap::new()),
            tasklists: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        })
    }

    pub fn shared(self) -> SharedOrchestrator {
        Arc::new(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &LayoutCatalog {
        &self.catalog
    }

    pub fn queue(&self) -> &SharedTaskQueue {
        &self.queue
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Spawn the worker pool and the loop feeding worker messages back in.
    pub fn start(self: &Arc<Self>, tool: SharedSlideTool) -> PipelineHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let settings = WorkerSettings {
            catalog: self.catalog.clone(),
            tool,
            tool_timeout: self.config.tool_timeout,
        };
        let pool = WorkerPool::spawn(self.config.pool_size, self.queue.clone(), settings, tx);

        let orchestrator = Arc::clone(self);
        let feedback = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = orchestrator.on_worker_message(message).await {
                    error!(error = %e, "Failed to apply worker message");
                }
            }
            debug!("Feedback loop finished");
        });

        PipelineHandle { pool, feedback }
    }

    // =========================================================================
    // Plan lifecycle
    // =========================================================================

    /// Store a plan as the unapproved draft. No tasks are created.
    pub async fn submit_draft_plan(&self, plan: Plan) -> PipelineResult<PlanId> {
        plan.validate(&self.catalog)?;
        let plan_id = plan.id.clone();
        let slides = plan.len();

        let revision = {
            let mut plans = self.plans.write().await;
            let record = plans.entry(plan_id.clone()).or_default();
            record.draft = Some(plan);
            record.revisions
        };

        info!(plan_id = %plan_id, slides, "Draft plan stored");
        self.events.publish(PipelineEvent::PlanDrafted {
            plan_id: plan_id.clone(),
            slides,
            revision,
            timestamp: Utc::now(),
        });
        Ok(plan_id)
    }

    /// Ask the planner for a plan and store it as a draft
    pub async fn generate_draft_plan(&self, content: &str) -> PipelineResult<Plan> {
        let plan = self
            .planner
            .generate_plan(content, &self.catalog.explanations())
            .await?;
        self.submit_draft_plan(plan.clone()).await?;
        Ok(plan)
    }

    /// Replace the draft with the planner's revision of it.
    ///
    /// Starts from the approved plan when there is no pending draft. The
    /// approved plan and its tasks are left alone.
    pub async fn revise_draft_plan(&self, plan_id: &str, feedback: &str) -> PipelineResult<Plan> {
        let base = {
            let plans = self.plans.read().await;
            let record = plans
                .get(plan_id)
                .ok_or_else(|| PipelineError::UnknownPlan(plan_id.to_string()))?;
            record
                .draft
                .clone()
                .or_else(|| record.approved.clone())
                .ok_or_else(|| PipelineError::NoDraft(plan_id.to_string()))?
        };

        let mut revised = self.planner.revise_plan(&base, feedback).await?;
        revised.id = base.id.clone();
        revised.validate(&self.catalog)?;

        let revision = {
            let mut plans = self.plans.write().await;
            let record = plans.entry(base.id.clone()).or_default();
            record.draft = Some(revised.clone());
            record.revisions += 1;
            record.revisions
        };

        info!(plan_id, revision, slides = revised.len(), "Draft plan revised");
        self.events.publish(PipelineEvent::PlanDrafted {
            plan_id: revised.id.clone(),
            slides: revised.len(),
            revision,
            timestamp: Utc::now(),
        });
        Ok(revised)
    }

    /// Approve the current draft: derive its tasklist from the previously
    /// approved one, cancel tasks whose slide changed, enqueue the new ones.
    pub async fn approve_plan(&self, plan_id: &str) -> PipelineResult<ApprovalSummary> {
        let _writer = self.writer.lock().await;

        let (plan, previous_version) = {
            let plans = self.plans.read().await;
            let record = plans
                .get(plan_id)
                .ok_or_else(|| PipelineError::UnknownPlan(plan_id.to_string()))?;
            let draft = record
                .draft
                .clone()
                .ok_or_else(|| PipelineError::NoDraft(plan_id.to_string()))?;
            (draft, record.version)
        };
        plan.validate(&self.catalog)?;

        let prior = self.snapshot(plan_id).await?;
        let version = previous_version.max(prior.as_ref().map_or(0, |p| p.plan_version)) + 1;
        let diff = derive_tasklist(prior.as_deref(), &plan, version);

        for task in &diff.discarded {
            self.queue.cancel(&task.id);
            self.events.publish(PipelineEvent::TaskCancelled {
                task_id: task.id.clone(),
                plan_id: plan.id.clone(),
                timestamp: Utc::now(),
            });
        }

        let tasklist = Arc::new(diff.tasklist);
        self.tasklists
            .write()
            .await
            .insert(plan.id.clone(), tasklist.clone());

        {
            let mut plans = self.plans.write().await;
            let record = plans.entry(plan.id.clone()).or_default();
            record.approved = Some(plan.clone());
            record.draft = None;
            record.version = version;
        }

        // Reused tasks are already queued or still owned by a worker
        let enqueued = self.enqueue_created(&tasklist, &diff.created)?;
        self.flush(&plan.id, &tasklist).await?;

        info!(
            plan_id = %plan.id,
            version,
            reused = diff.reused.len(),
            created = diff.created.len(),
            discarded = diff.discarded.len(),
            enqueued,
            "Plan approved"
        );
        self.events.publish(PipelineEvent::PlanApproved {
            plan_id: plan.id.clone(),
            version,
            reused: diff.reused.len(),
            created: diff.created.len(),
            discarded: diff.discarded.len(),
            timestamp: Utc::now(),
        });
        self.publish_view(&tasklist);

        Ok(ApprovalSummary {
            plan_id: plan.id,
            version,
            reused: diff.reused,
            created: diff.created,
            discarded: diff.discarded.into_iter().map(|t| t.id).collect(),
            enqueued,
        })
    }

    /// Rehydrate a tasklist from the store after a restart.
    ///
    /// Tasks left in flight are rolled back to pending without consuming an
    /// attempt; every pending task is enqueued.
    pub async fn resume(&self, plan_id: &str) -> PipelineResult<TasklistView> {
        let _writer = self.writer.lock().await;

        let mut tasklist = self
            .load(plan_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownPlan(plan_id.to_string()))?;

        let interrupted: Vec<TaskId> = tasklist
            .tasks()
            .filter(|t| t.status == TaskStatus::InFlight && !self.queue.is_in_flight(&t.id))
            .map(|t| t.id.clone())
            .collect();
        for task_id in interrupted {
            let rec = self
                .reconciler
                .reconcile(&tasklist, ReconcileInput::Interrupted { task_id })?;
            tasklist = rec.tasklist;
        }

        {
            let mut plans = self.plans.write().await;
            let record = plans.entry(plan_id.to_string()).or_default();
            record.version = record.version.max(tasklist.plan_version);
            if record.approved.is_none() {
                record.approved = Some(plan_from_tasklist(&tasklist));
            }
        }

        let tasklist = Arc::new(tasklist);
        self.tasklists
            .write()
            .await
            .insert(plan_id.to_string(), tasklist.clone());
        let enqueued = self.enqueue_pending(&tasklist)?;
        self.flush(plan_id, &tasklist).await?;

        info!(plan_id, tasks = tasklist.len(), enqueued, "Tasklist resumed");
        self.publish_view(&tasklist);
        Ok(tasklist.view())
    }

    // =========================================================================
    // Feedback
    // =========================================================================

    pub async fn on_worker_message(&self, message: WorkerMessage) -> PipelineResult<()> {
        match message {
            WorkerMessage::Started {
                task_id,
                plan_id,
                attempt,
                worker,
            } => self.on_task_started(&plan_id, task_id, attempt, &worker).await,
            WorkerMessage::Outcome(report) => self.on_outcome_report(report).await,
        }
    }

    /// Record that a worker began an attempt
    pub async fn on_task_started(
        &self,
        plan_id: &str,
        task_id: TaskId,
        attempt: u32,
        worker: &str,
    ) -> PipelineResult<()> {
        let input = ReconcileInput::Started {
            task_id: task_id.clone(),
            attempt,
        };
        if self
            .apply_worker_input(plan_id, &task_id, attempt, input)
            .await?
            .is_some()
        {
            self.events.publish(PipelineEvent::TaskStarted {
                task_id,
                plan_id: plan_id.to_string(),
                attempt,
                worker: worker.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Fold a worker's outcome report into the tasklist
    pub async fn on_outcome_report(&self, report: OutcomeReport) -> PipelineResult<()> {
        let plan_id = report.plan_id.clone();
        let task_id = report.task_id.clone();
        let attempt = report.attempt;
        self.apply_worker_input(&plan_id, &task_id, attempt, ReconcileInput::Outcome(report))
            .await?;
        Ok(())
    }

    /// Apply a human decision to a task that needs one
    pub async fn on_human_feedback(
        &self,
        task_id: &str,
        directive: HumanDirective,
    ) -> PipelineResult<ReconcileOutcome> {
        let plan_id = self
            .plan_of_task(task_id)
            .await
            .ok_or_else(|| PipelineError::UnknownTask(task_id.to_string()))?;

        info!(plan_id = %plan_id, task_id, ?directive, "Human feedback");
        self.apply(
            &plan_id,
            ReconcileInput::Human {
                task_id: task_id.to_string(),
                directive,
            },
        )
        .await
    }

    /// Like [`Self::apply`], but messages that no longer fit the tasklist are
    /// logged and dropped instead of failing.
    async fn apply_worker_input(
        &self,
        plan_id: &str,
        task_id: &str,
        attempt: u32,
        input: ReconcileInput,
    ) -> PipelineResult<Option<ReconcileOutcome>> {
        let discard = |reason: String| {
            warn!(plan_id, task_id, attempt, %reason, "Worker message discarded");
            self.events.publish(PipelineEvent::ReportDiscarded {
                task_id: task_id.to_string(),
                plan_id: plan_id.to_string(),
                attempt,
                reason,
                timestamp: Utc::now(),
            });
        };

        match self.apply(plan_id, input).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(PipelineError::Reconcile(e)) if e.is_discardable() => {
                discard(e.to_string());
                Ok(None)
            }
            Err(PipelineError::UnknownPlan(_)) => {
                discard(format!("unknown plan {}", plan_id));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Single write path: reconcile, swap the snapshot, act, flush.
    async fn apply(&self, plan_id: &str, input: ReconcileInput) -> PipelineResult<ReconcileOutcome> {
        let _writer = self.writer.lock().await;

        let current = self
            .snapshot(plan_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownPlan(plan_id.to_string()))?;
        let rec = self.reconciler.reconcile(&current, input)?;

        let tasklist = Arc::new(rec.tasklist);
        self.tasklists
            .write()
            .await
            .insert(plan_id.to_string(), tasklist.clone());

        self.announce(&tasklist, &rec.outcome);
        if let Some(task) = rec.outcome.task_to_enqueue() {
            self.requeue(task);
        }

        self.publish_view(&tasklist);
        if let Err(e) = self.flush(plan_id, &tasklist).await {
            error!(plan_id, error = %e, "Failed to persist tasklist");
            return Err(e);
        }
        Ok(rec.outcome)
    }

    async fn flush(&self, plan_id: &str, tasklist: &Arc<Tasklist>) -> PipelineResult<()> {
        let store = self.store.clone();
        let plan_id = plan_id.to_string();
        let tasklist = Arc::clone(tasklist);
        tokio::task::spawn_blocking(move || store.save_tasklist(&plan_id, &tasklist))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))??;
        Ok(())
    }

    async fn load(&self, plan_id: &str) -> PipelineResult<Option<Tasklist>> {
        let store = self.store.clone();
        let plan_id = plan_id.to_string();
        let tasklist = tokio::task::spawn_blocking(move || store.load_tasklist(&plan_id))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))??;
        Ok(tasklist)
    }

    fn announce(&self, tasklist: &Tasklist, outcome: &ReconcileOutcome) {
        let plan_id = tasklist.plan_id.clone();
        let timestamp = Utc::now();
        let explanation_of = |task_id: &str| {
            tasklist
                .get(task_id)
                .and_then(|t| t.last_explanation.clone())
                .unwrap_or_default()
        };

        let event = match outcome {
            ReconcileOutcome::Started { .. } | ReconcileOutcome::Resumed(_) => return,
            ReconcileOutcome::Succeeded { task_id, attempt } => {
                info!(plan_id = %plan_id, task_id = %task_id, attempt, "Task succeeded");
                PipelineEvent::TaskSucceeded {
                    task_id: task_id.clone(),
                    plan_id,
                    attempt: *attempt,
                    explanation: explanation_of(task_id),
                    timestamp,
                }
            }
            ReconcileOutcome::Requeued(task) => {
                info!(plan_id = %plan_id, task_id = %task.id, attempts = task.attempts, "Task failed, re-queued");
                PipelineEvent::TaskRetrying {
                    task_id: task.id.clone(),
                    plan_id,
                    attempt: task.attempts,
                    explanation: task.last_explanation.clone().unwrap_or_default(),
                    timestamp,
                }
            }
            ReconcileOutcome::NeedsHuman {
                task_id,
                explanation,
            } => {
                let attempts = tasklist.get(task_id).map_or(0, |t| t.attempts);
                warn!(plan_id = %plan_id, task_id = %task_id, attempts, %explanation, "Task needs a human");
                PipelineEvent::TaskNeedsHuman {
                    task_id: task_id.clone(),
                    plan_id,
                    attempts,
                    explanation: explanation.clone(),
                    timestamp,
                }
            }
            ReconcileOutcome::Reset(task) => PipelineEvent::TaskReset {
                task_id: task.id.clone(),
                plan_id,
                note: task.payload.adjustments.last().cloned().unwrap_or_default(),
                timestamp,
            },
            ReconcileOutcome::HandedOff { task_id } => PipelineEvent::TaskHandedOff {
                task_id: task_id.clone(),
                plan_id,
                timestamp,
            },
        };
        self.events.publish(event);
    }

    fn requeue(&self, task: &Task) {
        match self.queue.requeue(task.clone()) {
            Ok(()) => self.publish_queued(task),
            Err(e) => warn!(task_id = %task.id, error = %e, "Task not re-queued"),
        }
    }

    fn enqueue_created(&self, tasklist: &Tasklist, created: &[TaskId]) -> PipelineResult<usize> {
        let mut enqueued = 0;
        for task in created.iter().filter_map(|id| tasklist.get(id)) {
            self.queue.enqueue(task.clone())?;
            self.publish_queued(task);
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// Only for a rehydrated tasklist, where no worker can still be
    /// reporting on a pending task.
    fn enqueue_pending(&self, tasklist: &Tasklist) -> PipelineResult<usize> {
        let mut enqueued = 0;
        for task in tasklist.ordered() {
            if task.status != TaskStatus::Pending || self.queue.contains(&task.id) {
                continue;
            }
            self.queue.enqueue(task.clone())?;
            self.publish_queued(task);
            enqueued += 1;
        }
        Ok(enqueued)
    }

    fn publish_queued(&self, task: &Task) {
        self.events.publish(PipelineEvent::TaskQueued {
            task_id: task.id.clone(),
            plan_id: task.plan_id.clone(),
            slide_index: task.slide_index,
            timestamp: Utc::now(),
        });
    }

    fn publish_view(&self, tasklist: &Tasklist) {
        self.events.publish(PipelineEvent::TasklistUpdated {
            plan_id: tasklist.plan_id.clone(),
            version: tasklist.plan_version,
            counts: tasklist.counts(),
            timestamp: Utc::now(),
        });
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cached snapshot, falling back to the store
    async fn snapshot(&self, plan_id: &str) -> PipelineResult<Option<Arc<Tasklist>>> {
        if let Some(tasklist) = self.tasklists.read().await.get(plan_id) {
            return Ok(Some(tasklist.clone()));
        }
        match self.load(plan_id).await? {
            Some(tasklist) => {
                let tasklist = Arc::new(tasklist);
                self.tasklists
                    .write()
                    .await
                    .insert(plan_id.to_string(), tasklist.clone());
                Ok(Some(tasklist))
            }
            None => Ok(None),
        }
    }

    async fn plan_of_task(&self, task_id: &str) -> Option<PlanId> {
        self.tasklists
            .read()
            .await
            .iter()
            .find(|(_, list)| list.contains(task_id))
            .map(|(plan_id, _)| plan_id.clone())
    }

    /// Consistent snapshot of a plan's tasklist
    pub async fn tasklist_snapshot(&self, plan_id: &str) -> PipelineResult<Arc<Tasklist>> {
        self.snapshot(plan_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownPlan(plan_id.to_string()))
    }

    /// Per-task status, attempts and last explanation
    pub async fn get_tasklist_view(&self, plan_id: &str) -> PipelineResult<TasklistView> {
        Ok(self.tasklist_snapshot(plan_id).await?.view())
    }

    /// Wait until no task of the plan is pending, in flight or retrying.
    ///
    /// Does not time out; wrap in `tokio::time::timeout` where needed.
    pub async fn wait_for_settled(&self, plan_id: &str) -> PipelineResult<TasklistView> {
        let mut events = self.events.subscribe();
        loop {
            let snapshot = self.tasklist_snapshot(plan_id).await?;
            if snapshot.is_settled() {
                return Ok(snapshot.view());
            }
            loop {
                match events.recv().await {
                    Ok(PipelineEvent::TasklistUpdated { plan_id: ref id, .. }) if id == plan_id => {
                        break
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return Ok(self.tasklist_snapshot(plan_id).await?.view())
                    }
                }
            }
        }
    }

    pub async fn plan_record(&self, plan_id: &str) -> Option<PlanRecord> {
        self.plans.read().await.get(plan_id).cloned()
    }

    pub async fn draft_plan(&self, plan_id: &str) -> Option<Plan> {
        self.plans
            .read()
            .await
            .get(plan_id)
            .and_then(|r| r.draft.clone())
    }

    pub async fn approved_plan(&self, plan_id: &str) -> Option<Plan> {
        self.plans
            .read()
            .await
            .get(plan_id)
            .and_then(|r| r.approved.clone())
    }
}

/// Approved plan as recorded by a tasklist: each task's spec without the
/// adjustment notes humans merged in later.
fn plan_from_tasklist(tasklist: &Tasklist) -> Plan {
    let slides = tasklist
        .ordered()
        .into_iter()
        .map(|task| SlideSpec {
            adjustments: Vec::new(),
            ..task.payload.clone()
        })
        .collect();
    Plan::with_id(tasklist.plan_id.clone(), slides)
}

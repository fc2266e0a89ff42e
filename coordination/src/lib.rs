//! Deck Coordination Library
//!
//! Orchestrator–worker pipeline that builds a slide deck from an approved
//! plan:
//! - Template layout catalog and the plan model checked against it
//! - Task queue with at-most-one-in-flight per task
//! - Fixed-size worker pool applying one slide per attempt through the
//!   slide tool, with local correction of slide specs
//! - Orchestrator owning plan approval, content-addressed tasklist reuse and
//!   human feedback
//! - Pure feedback reconciler folding reports and directives into tasklists
//!
//! # Flow
//!
//! ```text
//! Orchestrator ──▶ TaskQueue ──▶ WorkerPool ──(outcome reports)──▶
//!     ▲                                                          │
//!     └──────── tasklist ◀── FeedbackReconciler ◀────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use deck_coordination::{InMemoryTasklistStore, Orchestrator, PipelineConfig};
//!
//! let orchestrator = Orchestrator::new(config, catalog, planner, store)?.shared();
//! let handle = orchestrator.start(tool);
//! let plan_id = orchestrator.submit_draft_plan(plan).await?;
//! orchestrator.approve_plan(&plan_id).await?;
//! let view = orchestrator.wait_for_settled(&plan_id).await?;
//! handle.shutdown().await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod collaborators;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod plan;
pub mod queue;
pub mod reconciler;
pub mod slides;
pub mod state;
pub mod template;
pub mod worker;

pub use collaborators::{
    PlanningCollaborator, PlanningError, SharedPlanner, SharedSlideTool, SlideReceipt, SlideTool,
    ToolError,
};
pub use config::{ConfigError, PipelineConfig, MAX_ATTEMPTS};
pub use events::{EventBus, EventBusExt, EventFilter, PipelineEvent, SharedEventBus};
pub use orchestrator::{
    ApprovalSummary, Orchestrator, PipelineError, PipelineHandle, PipelineResult, PlanRecord,
    SharedOrchestrator,
};
pub use plan::{Correction, Plan, PlanError, PlanId, SlideSpec};
pub use queue::{Lease, QueueError, SharedTaskQueue, TaskQueue};
pub use reconciler::{
    FeedbackReconciler, HumanDirective, ReconcileError, ReconcileInput, ReconcileOutcome,
};
pub use slides::{SlideBatch, ToolCall};
pub use state::{
    InMemoryTasklistStore, JsonFileTasklistStore, OutcomeReport, SharedTasklistStore, Task,
    TaskId, TaskStatus, Tasklist, TasklistStore, TasklistView,
};
pub use template::{LayoutCatalog, LayoutExplanation, PlaceholderKind, PlaceholderRole};
pub use worker::{Worker, WorkerMessage, WorkerPool};

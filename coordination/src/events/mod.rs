//! Event-driven observation of the build pipeline
//!
//! The orchestrator publishes a [`PipelineEvent`] for every plan and task
//! change. Subscribers (the CLI, tests, progress displays) read them from a
//! broadcast channel, optionally through an [`EventFilter`].
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::PipelineEvent;

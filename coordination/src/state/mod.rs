//! Task state for the build pipeline
//!
//! - `machine`: task statuses and the legal transitions between them
//! - `types`: [`Task`], [`Tasklist`] and the read-only [`TasklistView`]
//! - `report`: [`OutcomeReport`] emitted once per worker attempt
//! - `diff`: derivation of a tasklist from an approved plan, reusing
//!   content-identical tasks
//! - `store`: the persistence collaborator and its in-memory and JSON backends
//!
//! # Usage
//!
//! ```ignore
//! use deck_coordination::state::{derive_tasklist, JsonFileTasklistStore, TasklistStore};
//!
//! let store = JsonFileTasklistStore::open("./deck-state")?;
//! let diff = derive_tasklist(store.load_tasklist(&plan.id)?.as_ref(), &plan, 2);
//! store.save_tasklist(&plan.id, &diff.tasklist)?;
//! ```

pub mod diff;
pub mod machine;
pub mod report;
pub mod store;
pub mod types;

pub use diff::{derive_tasklist, TasklistDiff};
pub use machine::{is_legal_transition, IllegalTransition, TaskStatus, TransitionRecord};
pub use report::OutcomeReport;
pub use store::{
    InMemoryTasklistStore, JsonFileTasklistStore, SharedTasklistStore, StoreError, StoreResult,
    TasklistStore,
};
pub use types::{
    HumanAction, StatusCounts, Task, TaskId, TaskViewEntry, Tasklist, TasklistView,
};

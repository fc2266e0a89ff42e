//! Plan model
//!
//! A [`Plan`] is an ordered list of [`SlideSpec`]s produced by the planning
//! collaborator. Specs are content-addressed so that a re-approved plan can
//! keep the tasks of slides that did not change.

pub mod correction;
pub mod types;

pub use correction::{validate, validate_and_correct, CorrectedSpec, Correction};
pub use types::{Fingerprint, Plan, PlanError, PlanId, PlanResult, SlideSpec};

//! External collaborators of the pipeline
//!
//! The planning collaborator produces plans from content and revises them
//! from feedback. The slide tool applies one slide's batch of tool calls.
//! Both are opaque: only their outcomes matter here.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use crate::slides::SlideBatch;
use crate::template::LayoutExplanation;

/// Failure reported by the slide tool
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Transient; the attempt may be retried
    #[error("recoverable tool error: {0}")]
    Recoverable(String),

    /// The task cannot succeed without human help
    #[error("fatal tool error: {0}")]
    Fatal(String),
}

impl ToolError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Recoverable(msg) | Self::Fatal(msg) => msg,
        }
    }
}

/// Failure reported by the planning collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("planner unavailable: {0}")]
    Unavailable(String),

    #[error("planner returned an invalid plan: {0}")]
    InvalidPlan(String),
}

/// What the slide tool produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideReceipt {
    pub slide_object_id: String,
    /// Revision id of the deck after the batch, when the tool reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Applies a slide batch to the deck being built
#[async_trait]
pub trait SlideTool: Send + Sync {
    async fn apply(&self, batch: &SlideBatch) -> Result<SlideReceipt, ToolError>;
}

/// Shared reference to a slide tool
pub type SharedSlideTool = Arc<dyn SlideTool>;

/// Generates and revises plans
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanningCollaborator: Send + Sync {
    async fn generate_plan(
        &self,
        content: &str,
        layouts: &[LayoutExplanation],
    ) -> Result<Plan, PlanningError>;

    async fn revise_plan(&self, plan: &Plan, feedback: &str) -> Result<Plan, PlanningError>;
}

/// Shared reference to a planning collaborator
pub type SharedPlanner = Arc<dyn PlanningCollaborator>;

//! Collaborators for running without the remote services.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deck_coordination::slides::SlideBatch;
use deck_coordination::{
    LayoutExplanation, Plan, PlanningCollaborator, PlanningError, SlideReceipt, SlideTool,
    ToolError,
};
use tracing::info;

/// Slide tool that applies nothing. Batches are logged and, when an output
/// directory is set, written there as `<slide object id>.json`.
#[derive(Debug, Default)]
pub struct DryRunSlideTool {
    out_dir: Option<PathBuf>,
    applied: AtomicUsize,
}

impl DryRunSlideTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_out_dir(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: Some(out_dir.into()),
            applied: AtomicUsize::new(0),
        }
    }

    /// Batches accepted so far
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlideTool for DryRunSlideTool {
    async fn apply(&self, batch: &SlideBatch) -> Result<SlideReceipt, ToolError> {
        if let Some(dir) = &self.out_dir {
            let json = serde_json::to_string_pretty(batch)
                .map_err(|e| ToolError::Fatal(format!("batch not serializable: {}", e)))?;
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ToolError::Recoverable(format!("{}: {}", dir.display(), e)))?;
            let path = dir.join(format!("{}.json", batch.slide_object_id));
            tokio::fs::write(&path, json)
                .await
                .map_err(|e| ToolError::Recoverable(format!("{}: {}", path.display(), e)))?;
        }

        let n = self.applied.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            slide = batch.slide_index,
            object_id = %batch.slide_object_id,
            calls = batch.len(),
            "Dry run: batch accepted"
        );
        Ok(SlideReceipt {
            slide_object_id: batch.slide_object_id.clone(),
            revision: Some(format!("dry-run-{}", n)),
        })
    }
}

/// Planner stand-in when no planning service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflinePlanner;

const NO_PLANNER: &str = "no planning service configured (pass --planner-url)";

#[async_trait]
impl PlanningCollaborator for OfflinePlanner {
    async fn generate_plan(
        &self,
        _content: &str,
        _layouts: &[LayoutExplanation],
    ) -> Result<Plan, PlanningError> {
        Err(PlanningError::Unavailable(NO_PLANNER.to_string()))
    }

    async fn revise_plan(&self, _plan: &Plan, _feedback: &str) -> Result<Plan, PlanningError> {
        Err(PlanningError::Unavailable(NO_PLANNER.to_string()))
    }
}

//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use deck_coordination::slides::SlideBatch;
use deck_coordination::template::{Placeholder, TemplateLayout};
use deck_coordination::{
    LayoutCatalog, LayoutExplanation, Orchestrator, PipelineEvent, Plan, PlaceholderKind,
    PlaceholderRole, PlanningCollaborator, PlanningError, SlideReceipt, SlideSpec, SlideTool,
    TasklistView, ToolError,
};

pub const WAIT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("deck_coordination=debug")
        .with_test_writer()
        .try_init();
}

pub fn catalog() -> LayoutCatalog {
    LayoutCatalog::new(vec![
        TemplateLayout::new(
            "layout_title",
            vec![
                Placeholder {
                    kind: PlaceholderKind::CenteredTitle,
                    index: None,
                    object_id: "lt_title".to_string(),
                },
                Placeholder {
                    kind: PlaceholderKind::Subtitle,
                    index: None,
                    object_id: "lt_sub".to_string(),
                },
            ],
        ),
        TemplateLayout::new(
            "layout_content",
            vec![
                Placeholder {
                    kind: PlaceholderKind::Title,
                    index: None,
                    object_id: "lc_title".to_string(),
                },
                Placeholder {
                    kind: PlaceholderKind::Body,
                    index: Some(1),
                    object_id: "lc_body".to_string(),
                },
            ],
        ),
    ])
}

pub fn content_slide(title: &str, body: &str) -> SlideSpec {
    SlideSpec::new("layout_content")
        .with_content(PlaceholderRole::kind(PlaceholderKind::Title), title)
        .with_content(PlaceholderRole::indexed(PlaceholderKind::Body, 1), body)
}

pub fn three_slide_plan() -> Plan {
    Plan::new(vec![
        content_slide("Intro", "<p>Why we are here</p>"),
        content_slide("Numbers", "<ul><li>Revenue up</li><li>Costs flat</li></ul>"),
        content_slide("Next steps", "Hire <b>two</b> engineers"),
    ])
}

/// Planner that is never expected to be called
pub struct UnusedPlanner;

#[async_trait]
impl PlanningCollaborator for UnusedPlanner {
    async fn generate_plan(
        &self,
        _content: &str,
        _layouts: &[LayoutExplanation],
    ) -> Result<Plan, PlanningError> {
        Err(PlanningError::Unavailable("no planner in this test".to_string()))
    }

    async fn revise_plan(&self, _plan: &Plan, _feedback: &str) -> Result<Plan, PlanningError> {
        Err(PlanningError::Unavailable("no planner in this test".to_string()))
    }
}

/// Slide tool whose calls block per slide index until the test opens the
/// gate, answering from a per-slide script (success once the script runs out).
#[derive(Default)]
pub struct GatedTool {
    gates: Mutex<HashMap<usize, Arc<Semaphore>>>,
    scripts: Mutex<HashMap<usize, Vec<Result<(), ToolError>>>>,
    calls: Mutex<Vec<SlideBatch>>,
}

impl GatedTool {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, slide_index: usize) -> Arc<Semaphore> {
        self.gates
            .lock()
            .unwrap()
            .entry(slide_index)
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    /// Let `n` more calls for the slide through
    pub fn open(&self, slide_index: usize, n: usize) {
        self.gate(slide_index).add_permits(n);
    }

    pub fn script(&self, slide_index: usize, replies: Vec<Result<(), ToolError>>) {
        self.scripts.lock().unwrap().insert(slide_index, replies);
    }

    pub fn calls(&self) -> Vec<SlideBatch> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, slide_index: usize) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.slide_index == slide_index)
            .count()
    }
}

#[async_trait]
impl SlideTool for GatedTool {
    async fn apply(&self, batch: &SlideBatch) -> Result<SlideReceipt, ToolError> {
        let gate = self.gate(batch.slide_index);
        let permit = gate
            .acquire_owned()
            .await
            .map_err(|_| ToolError::Fatal("gate closed".to_string()))?;
        permit.forget();

        self.calls.lock().unwrap().push(batch.clone());
        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&batch.slide_index) {
                Some(script) if !script.is_empty() => script.remove(0),
                _ => Ok(()),
            }
        };
        reply.map(|_| SlideReceipt {
            slide_object_id: batch.slide_object_id.clone(),
            revision: Some(format!("rev-{}", self.calls.lock().unwrap().len())),
        })
    }
}

/// Wait (bounded) until the plan's view satisfies `pred`
pub async fn wait_for<F>(orchestrator: &Orchestrator, plan_id: &str, pred: F) -> TasklistView
where
    F: Fn(&TasklistView) -> bool,
{
    let mut events = orchestrator.events().subscribe();
    let waited = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(view) = orchestrator.get_tasklist_view(plan_id).await {
                if pred(&view) {
                    return view;
                }
            }
            loop {
                match events.recv().await {
                    Ok(PipelineEvent::TasklistUpdated { .. }) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
    })
    .await;

    match waited {
        Ok(view) => view,
        Err(_) => panic!(
            "timed out waiting; last view: {:#?}",
            orchestrator.get_tasklist_view(plan_id).await.ok()
        ),
    }
}

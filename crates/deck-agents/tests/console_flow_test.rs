//! Console-driven build flows against offline collaborators.
//!
//! Tests verify:
//! - The approval gate revises through the planner and approves on command
//! - End of input at the gate means "not approved"
//! - A dry-run build of a plan document settles with every slide built
//! - Tasks needing a human are shown with their explanation and accept
//!   a hand-off from the console

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deck_agents::console::{approval_gate, review_loop};
use deck_agents::offline::{DryRunSlideTool, OfflinePlanner};
use deck_agents::plan_file::plan_from_json;
use deck_coordination::slides::SlideBatch;
use deck_coordination::{
    InMemoryTasklistStore, LayoutCatalog, LayoutExplanation, Orchestrator, PipelineConfig, Plan,
    PlanningCollaborator, PlanningError, SharedPlanner, SlideReceipt, SlideTool, TaskStatus,
    ToolError,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const WAIT: Duration = Duration::from_secs(10);

const TEMPLATE: &str = r#"{
    "presentationData": {
        "layouts": [
            {
                "objectId": "layout_title",
                "layoutProperties": { "displayName": "Title slide" },
                "pageElements": [
                    { "objectId": "lt_t", "shape": { "placeholder": { "type": "CENTERED_TITLE" } } },
                    { "objectId": "lt_s", "shape": { "placeholder": { "type": "SUBTITLE", "index": { "$numberInt": "0" } } } }
                ]
            },
            {
                "objectId": "layout_content",
                "layoutProperties": { "displayName": "Title and body" },
                "pageElements": [
                    { "objectId": "lc_t", "shape": { "placeholder": { "type": "TITLE" } } },
                    { "objectId": "lc_b", "shape": { "placeholder": { "type": "BODY", "index": "1" } } }
                ]
            }
        ]
    }
}"#;

const PLAN: &str = r#"{
    "presentation_plan": [
        {
            "objectId": "layout_title",
            "content": { "CENTERED_TITLE": { "null": "Q3 <b>review</b>" } },
            "instructions": "Open with the headline"
        },
        {
            "objectId": "layout_content",
            "content": {
                "TITLE": { "null": "Numbers" },
                "BODY": { "1": "<ul><li>Revenue up</li><li>Costs flat</li></ul>" }
            },
            "instructions": "Keep the list short"
        },
        {
            "objectId": "layout_content",
            "content": { "TITLE": { "null": "Next steps" }, "BODY": { "1": "<p>Hire</p>" } },
            "instructions": ""
        }
    ]
}"#;

/// Planner whose revisions append a closing slide
struct ClosingSlidePlanner;

#[async_trait]
impl PlanningCollaborator for ClosingSlidePlanner {
    async fn generate_plan(
        &self,
        _content: &str,
        _layouts: &[LayoutExplanation],
    ) -> Result<Plan, PlanningError> {
        Err(PlanningError::Unavailable("not used".to_string()))
    }

    async fn revise_plan(&self, plan: &Plan, feedback: &str) -> Result<Plan, PlanningError> {
        let mut slides = plan.slides.clone();
        let mut closing = slides[0].clone();
        closing.instructions = Some(feedback.to_string());
        slides.push(closing);
        Ok(Plan::with_id(plan.id.clone(), slides))
    }
}

/// Slide tool that rejects every batch as unrecoverable
struct RejectingTool;

#[async_trait]
impl SlideTool for RejectingTool {
    async fn apply(&self, _batch: &SlideBatch) -> Result<SlideReceipt, ToolError> {
        Err(ToolError::Fatal("presentation not found".to_string()))
    }
}

fn orchestrator(planner: SharedPlanner) -> Arc<Orchestrator> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("deck_coordination=debug,deck_agents=debug")
        .with_test_writer()
        .try_init();
    Orchestrator::new(
        PipelineConfig::default().with_pool_size(2),
        LayoutCatalog::from_template_json(TEMPLATE).unwrap(),
        planner,
        InMemoryTasklistStore::new().shared(),
    )
    .unwrap()
    .shared()
}

fn input(text: &str) -> tokio::io::Lines<BufReader<&[u8]>> {
    BufReader::new(text.as_bytes()).lines()
}

#[tokio::test]
async fn test_gate_revises_then_approves() {
    let orch = orchestrator(Arc::new(ClosingSlidePlanner));
    let plan_id = orch
        .submit_draft_plan(plan_from_json(PLAN).unwrap())
        .await
        .unwrap();

    let mut lines = input("revise end with a thank-you slide\nbogus\napprove\n");
    let mut out = Vec::new();
    let approved = approval_gate(&orch, &plan_id, &mut lines, &mut out)
        .await
        .unwrap();

    assert!(approved);
    let draft = orch.draft_plan(&plan_id).await.unwrap();
    assert_eq!(draft.len(), 4);
    assert_eq!(
        draft.slides[3].instructions.as_deref(),
        Some("end with a thank-you slide")
    );

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Draft plan"));
    assert!(out.contains("(4 slides)"));
    assert!(out.contains("unknown command 'bogus'"));
}

#[tokio::test]
async fn test_gate_failed_revision_keeps_draft() {
    let orch = orchestrator(Arc::new(OfflinePlanner));
    let plan_id = orch
        .submit_draft_plan(plan_from_json(PLAN).unwrap())
        .await
        .unwrap();

    let mut lines = input("revise more charts\n");
    let mut out = Vec::new();
    let approved = approval_gate(&orch, &plan_id, &mut lines, &mut out)
        .await
        .unwrap();

    // End of input after the failed revision
    assert!(!approved);
    assert_eq!(orch.draft_plan(&plan_id).await.unwrap().len(), 3);
    assert!(String::from_utf8(out)
        .unwrap()
        .contains("Revision failed, the draft is unchanged"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dry_run_build_settles() {
    let orch = orchestrator(Arc::new(OfflinePlanner));
    let tool = Arc::new(DryRunSlideTool::new());
    let handle = orch.start(tool.clone());

    let plan_id = orch
        .submit_draft_plan(plan_from_json(PLAN).unwrap())
        .await
        .unwrap();
    orch.approve_plan(&plan_id).await.unwrap();

    let mut lines = input("");
    let mut out = Vec::new();
    let view = tokio::time::timeout(WAIT, review_loop(&orch, &plan_id, &mut lines, &mut out))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(view.counts.succeeded, 3);
    assert_eq!(tool.applied(), 3);
    assert!(view.tasks.iter().all(|t| t.attempts == 1));
    assert!(String::from_utf8(out).unwrap().contains("3 succeeded"));

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_review_hands_off_failed_slide() {
    let orch = orchestrator(Arc::new(OfflinePlanner));
    let handle = orch.start(Arc::new(RejectingTool));

    let plan = Plan::new(plan_from_json(PLAN).unwrap().slides[..1].to_vec());
    let plan_id = orch.submit_draft_plan(plan).await.unwrap();
    orch.approve_plan(&plan_id).await.unwrap();

    // An unknown task id is reported, then input ends
    let mut lines = input("retry task-nope try again\n");
    let mut out = Vec::new();
    let view = tokio::time::timeout(WAIT, review_loop(&orch, &plan_id, &mut lines, &mut out))
        .await
        .unwrap()
        .unwrap();

    let task = &view.tasks[0];
    assert_eq!(task.status, TaskStatus::NeedsHuman);
    assert_eq!(task.attempts, 1);
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("presentation not found"));
    assert!(out.contains("actions: retry <task> <note> | handoff <task>"));
    assert!(out.contains("Not applied"));

    let command = format!("handoff {}\n", task.task_id);
    let mut lines = input(&command);
    let mut out = Vec::new();
    let view = tokio::time::timeout(WAIT, review_loop(&orch, &plan_id, &mut lines, &mut out))
        .await
        .unwrap()
        .unwrap();

    assert!(view.tasks[0].handed_off);
    assert_eq!(view.counts.handed_off, 1);
    assert!(String::from_utf8(out).unwrap().contains("handed_off"));

    handle.shutdown().await;
}

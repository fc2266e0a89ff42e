//! End-to-end pipeline scenarios with a real worker pool and a gated slide tool.
//!
//! Tests verify:
//! - A pool of two holds two tasks in flight while the third waits
//! - A freed worker picks up the waiting task
//! - Five recoverable failures escalate to a human with the fifth explanation
//! - Retry-with-note resets attempts and carries the note into the slide
//! - Hand-off makes the task terminal

mod common;

use std::sync::Arc;

use common::*;
use deck_coordination::{
    HumanDirective, InMemoryTasklistStore, Orchestrator, PipelineConfig, ReconcileOutcome,
    TaskStatus, ToolCall, ToolError,
};

fn pipeline(pool_size: usize) -> Arc<Orchestrator> {
    init_tracing();
    let config = PipelineConfig::default()
        .with_pool_size(pool_size)
        .with_retry_ceiling(5)
        .validated()
        .unwrap();
    Orchestrator::new(
        config,
        catalog(),
        Arc::new(UnusedPlanner),
        InMemoryTasklistStore::new().shared(),
    )
    .unwrap()
    .shared()
}

fn busy(n: usize) -> Vec<Result<(), ToolError>> {
    (1..=n)
        .map(|i| Err(ToolError::Recoverable(format!("render backend busy (call {})", i))))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_slides_pool_of_two() {
    let orchestrator = pipeline(2);
    let tool = Arc::new(GatedTool::new());
    tool.script(1, busy(5));
    let handle = orchestrator.start(tool.clone());

    let plan_id = orchestrator
        .submit_draft_plan(three_slide_plan())
        .await
        .unwrap();
    orchestrator.approve_plan(&plan_id).await.unwrap();

    // Two workers hold slides 0 and 1; slide 2 waits
    let view = wait_for(&orchestrator, &plan_id, |v| v.counts.in_flight == 2).await;
    assert_eq!(view.counts.pending, 1);
    assert_eq!(view.tasks[0].status, TaskStatus::InFlight);
    assert_eq!(view.tasks[1].status, TaskStatus::InFlight);
    assert_eq!(view.tasks[2].status, TaskStatus::Pending);

    // First slide succeeds, freeing a worker for the third
    tool.open(0, 1);
    let view = wait_for(&orchestrator, &plan_id, |v| {
        v.tasks[0].status == TaskStatus::Succeeded && v.tasks[2].status == TaskStatus::InFlight
    })
    .await;
    assert_eq!(view.tasks[0].attempts, 1);

    // Second slide fails five times
    tool.open(1, 5);
    tool.open(2, 1);
    let view = wait_for(&orchestrator, &plan_id, |v| {
        v.counts.active() == 0
    })
    .await;

    let second = &view.tasks[1];
    assert_eq!(second.status, TaskStatus::NeedsHuman);
    assert_eq!(second.attempts, 5);
    assert!(second
        .last_failure
        .as_deref()
        .unwrap()
        .ends_with("render backend busy (call 5)"));
    assert_eq!(second.last_explanation, second.last_failure);
    assert_eq!(second.actions.len(), 2);
    assert_eq!(tool.calls_for(1), 5);

    // The failure never blocked the others
    assert_eq!(view.tasks[2].status, TaskStatus::Succeeded);
    assert_eq!(view.counts.succeeded, 2);

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_with_note_after_exhaustion() {
    let orchestrator = pipeline(2);
    let tool = Arc::new(GatedTool::new());
    tool.script(0, busy(5));
    tool.open(0, 5);
    let handle = orchestrator.start(tool.clone());

    let plan_id = orchestrator
        .submit_draft_plan(deck_coordination::Plan::new(vec![content_slide(
            "Only", "slide",
        )]))
        .await
        .unwrap();
    orchestrator.approve_plan(&plan_id).await.unwrap();

    let view = wait_for(&orchestrator, &plan_id, |v| {
        v.tasks[0].status == TaskStatus::NeedsHuman
    })
    .await;
    let task_id = view.tasks[0].task_id.clone();

    let outcome = orchestrator
        .on_human_feedback(
            &task_id,
            HumanDirective::RetryWithNote {
                note: "shorten the title".to_string(),
            },
        )
        .await
        .unwrap();
    match outcome {
        ReconcileOutcome::Reset(task) => {
            assert_eq!(task.attempts, 0);
            assert_eq!(task.status, TaskStatus::Pending);
            assert_eq!(task.payload.adjustments, vec!["shorten the title".to_string()]);
        }
        other => panic!("expected reset, got {:?}", other),
    }

    tool.open(0, 1);
    let view = wait_for(&orchestrator, &plan_id, |v| {
        v.tasks[0].status == TaskStatus::Succeeded
    })
    .await;
    assert_eq!(view.tasks[0].task_id, task_id);
    assert_eq!(view.tasks[0].attempts, 1);

    let last = tool.calls().pop().unwrap();
    assert!(last.calls.iter().any(|c| matches!(
        c,
        ToolCall::SetSpeakerNotes { text, .. } if text.contains("shorten the title")
    )));

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fatal_error_then_hand_off() {
    let orchestrator = pipeline(1);
    let tool = Arc::new(GatedTool::new());
    tool.script(0, vec![Err(ToolError::Fatal("presentation not found".to_string()))]);
    tool.open(0, 1);
    let handle = orchestrator.start(tool.clone());

    let plan_id = orchestrator
        .submit_draft_plan(deck_coordination::Plan::new(vec![content_slide("A", "b")]))
        .await
        .unwrap();
    orchestrator.approve_plan(&plan_id).await.unwrap();

    let view = wait_for(&orchestrator, &plan_id, |v| {
        v.tasks[0].status == TaskStatus::NeedsHuman
    })
    .await;
    assert_eq!(view.tasks[0].attempts, 1);
    assert_eq!(tool.calls_for(0), 1);

    let task_id = view.tasks[0].task_id.clone();
    orchestrator
        .on_human_feedback(&task_id, HumanDirective::HandOff)
        .await
        .unwrap();

    let view = orchestrator.get_tasklist_view(&plan_id).await.unwrap();
    assert!(view.tasks[0].handed_off);
    assert!(view.tasks[0].actions.is_empty());
    assert_eq!(view.counts.handed_off, 1);

    // A handed-off task accepts no further directives
    assert!(orchestrator
        .on_human_feedback(
            &task_id,
            HumanDirective::RetryWithNote {
                note: "again".to_string()
            }
        )
        .await
        .is_err());

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_settled() {
    let orchestrator = pipeline(2);
    let tool = Arc::new(GatedTool::new());
    for slide in 0..3 {
        tool.open(slide, 1);
    }
    let handle = orchestrator.start(tool);

    let plan_id = orchestrator
        .submit_draft_plan(three_slide_plan())
        .await
        .unwrap();
    orchestrator.approve_plan(&plan_id).await.unwrap();

    let view = tokio::time::timeout(WAIT, orchestrator.wait_for_settled(&plan_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.counts.succeeded, 3);

    handle.shutdown().await;
}

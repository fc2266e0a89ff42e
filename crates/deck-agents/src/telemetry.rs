//! Logging setup and the pipeline event log.
//!
//! Two sinks for pipeline events:
//! - the tracing subscriber (stderr), one line per event
//! - an optional append-only JSONL file, one event object per line

use std::io::Write;
use std::path::{Path, PathBuf};

use deck_coordination::events::FilteredReceiver;
use deck_coordination::{EventBusExt, EventFilter, PipelineEvent, SharedEventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Install the global subscriber. `RUST_LOG` wins; otherwise `info`.
///
/// Logs go to stderr so stdout stays free for tasklist views.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Append one event to a JSONL file
pub fn append_event(event: &PipelineEvent, path: &Path) {
    match serde_json::to_string(event) {
        Ok(json) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append event: {e}");
                    }
                }
                Err(e) => warn!("Failed to open event log: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize event: {e}"),
    }
}

fn log_event(event: &PipelineEvent) {
    let kind = event.event_type();
    let plan_id = event.plan_id();
    let task_id = event.task_id().unwrap_or("-");
    match event {
        PipelineEvent::TaskNeedsHuman { explanation, .. } => {
            warn!(kind, plan_id, task_id, %explanation, "pipeline event")
        }
        PipelineEvent::ReportDiscarded { reason, .. } => {
            warn!(kind, plan_id, task_id, %reason, "pipeline event")
        }
        PipelineEvent::TaskQueued { .. } | PipelineEvent::TasklistUpdated { .. } => {
            debug!(kind, plan_id, task_id, "pipeline event")
        }
        _ => info!(kind, plan_id, task_id, "pipeline event"),
    }
}

async fn drain(mut events: FilteredReceiver, jsonl: Option<PathBuf>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                log_event(&event);
                if let Some(path) = &jsonl {
                    append_event(&event, path);
                }
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "Event logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Log every matching pipeline event until the bus closes or the handle is
/// aborted.
pub fn spawn_event_logger(
    events: &SharedEventBus,
    filter: EventFilter,
    jsonl: Option<PathBuf>,
) -> JoinHandle<()> {
    tokio::spawn(drain(events.subscribe_filtered(filter), jsonl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deck_coordination::EventBus;

    fn queued(plan_id: &str, task_id: &str) -> PipelineEvent {
        PipelineEvent::TaskQueued {
            task_id: task_id.to_string(),
            plan_id: plan_id.to_string(),
            slide_index: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_event_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        append_event(&queued("p1", "t1"), &path);
        append_event(&queued("p1", "t2"), &path);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: PipelineEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.task_id(), Some("t2"));
        assert!(lines[0].contains(r#""type":"task_queued""#));
    }

    #[tokio::test]
    async fn test_logger_writes_only_matching_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let bus = EventBus::new().shared();
        let logger = spawn_event_logger(&bus, EventFilter::new().plan("p1"), Some(path.clone()));

        bus.publish(queued("p2", "other"));
        bus.publish(queued("p1", "mine"));
        drop(bus);
        logger.await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("mine"));
    }
}

//! Event bus for the build pipeline
//!
//! Pub/sub over a Tokio broadcast channel. Slow subscribers lag and lose the
//! oldest events rather than blocking publishers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::PipelineEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus over a broadcast channel
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Having none is not an error.
    pub fn publish(&self, event: PipelineEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub plan_id: Option<String>,
    pub task_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, plan_id: &str) -> Self {
        self.plan_id = Some(plan_id.to_string());
        self
    }

    /// Filter by task ID. Events without a task id do not match.
    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &PipelineEvent) -> bool {
        if let Some(ref pid) = self.plan_id {
            if event.plan_id() != pid {
                return false;
            }
        }

        if let Some(ref tid) = self.task_id {
            if event.task_id() != Some(tid.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<PipelineEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<PipelineEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<PipelineEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn queued(task_id: &str, plan_id: &str) -> PipelineEvent {
        PipelineEvent::TaskQueued {
            task_id: task_id.to_string(),
            plan_id: plan_id.to_string(),
            slide_index: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(queued("task-1", "plan-1"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "task_queued");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        bus.publish(queued("task-1", "plan-1"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(queued("task-1", "plan-1"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.task_id(), e2.task_id());
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .plan("plan-1")
            .types(vec!["task_queued", "task_succeeded"]);

        let updated = PipelineEvent::TasklistUpdated {
            plan_id: "plan-1".to_string(),
            version: 1,
            counts: Default::default(),
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&queued("task-1", "plan-1")));
        assert!(!filter.matches(&queued("task-1", "plan-2")));
        assert!(!filter.matches(&updated));
        assert!(!EventFilter::new().task("task-1").matches(&updated));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().task("target-task"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(queued("other-task", "plan-1"));
            publisher.publish(queued("target-task", "plan-1"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.task_id(), Some("target-task"));
    }
}

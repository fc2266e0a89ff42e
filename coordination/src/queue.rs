//! Task queue shared by the orchestrator and the worker pool
//!
//! FIFO over pending tasks with an in-flight set. Taking a task moves it to
//! the in-flight set under the same lock, so a task id is held by at most one
//! worker at a time. The backlog is unbounded; the pool size is the only flow
//! control.
//!
//! ```text
//!   enqueue/requeue ──▶ [ pending (FIFO) ] ──dequeue──▶ { in flight } ──release──▶
//!                                                          │
//!                                               cancel ────┘ (token fired)
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::state::{Task, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("task {0} is already pending or in flight")]
    AlreadyQueued(TaskId),

    #[error("queue is closed")]
    Closed,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Shared reference to a task queue
pub type SharedTaskQueue = Arc<TaskQueue>;

/// A task handed to one worker for one attempt
#[derive(Debug, Clone)]
pub struct Lease {
    /// Snapshot of the task when it was taken
    pub task: Task,
    /// Attempt number this lease runs (1-based)
    pub attempt: u32,
    pub lease_id: u64,
    /// Fired when the task is cancelled while in flight
    pub cancel: CancellationToken,
}

impl Lease {
    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct Held {
    lease_id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<Task>,
    in_flight: HashMap<TaskId, Held>,
    next_lease: u64,
    closed: bool,
}

impl QueueInner {
    fn is_pending(&self, task_id: &str) -> bool {
        self.pending.iter().any(|t| t.id == task_id)
    }
}

#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    available: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedTaskQueue {
        Arc::new(self)
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a pending task
    pub fn enqueue(&self, task: Task) -> QueueResult<()> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            if inner.is_pending(&task.id) || inner.in_flight.contains_key(&task.id) {
                return Err(QueueError::AlreadyQueued(task.id));
            }
            debug!(task_id = %task.id, slide = task.slide_index, "Task enqueued");
            inner.pending.push_back(task);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Return a task to the back of the queue, keeping its attempt count.
    ///
    /// Clears any in-flight hold the task still has.
    pub fn requeue(&self, task: Task) -> QueueResult<()> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            if inner.is_pending(&task.id) {
                return Err(QueueError::AlreadyQueued(task.id));
            }
            inner.in_flight.remove(&task.id);
            debug!(task_id = %task.id, attempts = task.attempts, "Task requeued");
            inner.pending.push_back(task);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest pending task, if any, moving it in flight.
    pub fn dequeue(&self) -> Option<Lease> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        let task = inner.pending.pop_front()?;

        inner.next_lease += 1;
        let lease_id = inner.next_lease;
        let cancel = CancellationToken::new();
        inner.in_flight.insert(
            task.id.clone(),
            Held {
                lease_id,
                cancel: cancel.clone(),
            },
        );

        Some(Lease {
            attempt: task.attempts + 1,
            task,
            lease_id,
            cancel,
        })
    }

    /// Wait for the next task. Returns `None` once the queue is closed.
    pub async fn next_lease(&self) -> Option<Lease> {
        loop {
            // Register before checking so a close between the check and the
            // await is not missed
            let notified = self.available.notified();
            if let Some(lease) = self.dequeue() {
                return Some(lease);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Drop the in-flight hold of a finished attempt. A lease that was
    /// superseded does not release the newer hold.
    pub fn release(&self, lease: &Lease) -> bool {
        let mut inner = self.lock();
        match inner.in_flight.get(lease.task_id()) {
            Some(held) if held.lease_id == lease.lease_id => {
                inner.in_flight.remove(lease.task_id());
                true
            }
            _ => false,
        }
    }

    /// Remove a pending task, or fire the token of an in-flight one.
    pub fn cancel(&self, task_id: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|t| t.id != task_id);
        if inner.pending.len() != before {
            debug!(task_id, "Pending task cancelled");
            return true;
        }
        match inner.in_flight.get(task_id) {
            Some(held) => {
                held.cancel.cancel();
                debug!(task_id, "In-flight task cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop handing out tasks and wake every waiting worker.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn is_in_flight(&self, task_id: &str) -> bool {
        self.lock().in_flight.contains_key(task_id)
    }

    /// Pending or in flight
    pub fn contains(&self, task_id: &str) -> bool {
        let inner = self.lock();
        inner.is_pending(task_id) || inner.in_flight.contains_key(task_id)
    }
}

//! Fixed-size worker pool
//!
//! N workers share one queue and one message channel. There is no
//! worker-to-worker communication.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{Worker, WorkerMessage, WorkerSettings};
use crate::queue::SharedTaskQueue;

pub struct WorkerPool {
    queue: SharedTaskQueue,
    workers: JoinSet<()>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime
    pub fn spawn(
        size: usize,
        queue: SharedTaskQueue,
        settings: WorkerSettings,
        messages: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        let mut workers = JoinSet::new();
        for i in 0..size {
            let worker = Worker::new(
                format!("worker-{}", i),
                queue.clone(),
                settings.clone(),
                messages.clone(),
            );
            workers.spawn(worker.run());
        }
        info!(size, "Worker pool started");

        Self {
            queue,
            workers,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Close the queue and wait for every worker to finish its current attempt.
    pub async fn shutdown(mut self) {
        self.queue.close();
        while let Some(res) = self.workers.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "worker task panicked");
            }
        }
        info!(size = self.size, "Worker pool stopped");
    }
}

//! Concurrency tests for the task queue.
//!
//! Tests verify:
//! - Many concurrent consumers never receive the same task twice
//! - A task id is held by at most one lease at a time
//! - Closing the queue wakes every idle consumer

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use deck_coordination::{Task, TaskQueue};

fn tasks(n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| Task::new("plan-q", i, content_slide(&format!("Slide {}", i), "body")))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_consumers_take_each_task_once() {
    let queue = TaskQueue::new().shared();
    for task in tasks(200) {
        queue.enqueue(task).unwrap();
    }

    let taken = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        let taken = taken.clone();
        handles.push(tokio::spawn(async move {
            while let Some(lease) = queue.dequeue() {
                taken.lock().unwrap().push(lease.task.id.clone());
                tokio::task::yield_now().await;
                assert!(queue.release(&lease));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let taken = taken.lock().unwrap();
    let unique: HashSet<_> = taken.iter().collect();
    assert_eq!(taken.len(), 200);
    assert_eq!(unique.len(), 200);
    assert_eq!(queue.in_flight_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requeued_task_never_held_twice() {
    let queue = TaskQueue::new().shared();
    for task in tasks(4) {
        queue.enqueue(task).unwrap();
    }

    let holding: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        let holding = holding.clone();
        let attempts = attempts.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let lease = match tokio::time::timeout(Duration::from_millis(200), queue.next_lease()).await {
                    Ok(Some(lease)) => lease,
                    _ => break,
                };
                assert!(
                    holding.lock().unwrap().insert(lease.task.id.clone()),
                    "task {} leased twice",
                    lease.task.id
                );
                tokio::time::sleep(Duration::from_millis(1)).await;
                holding.lock().unwrap().remove(&lease.task.id);

                // Every task fails twice before it is done
                if lease.attempt < 3 {
                    let mut task = lease.task.clone();
                    task.attempts = lease.attempt;
                    queue.requeue(task).unwrap();
                } else {
                    assert!(queue.release(&lease));
                }
                attempts.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 12);
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(queue.in_flight_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_wakes_idle_consumers() {
    let queue = TaskQueue::new().shared();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move { queue.next_lease().await }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.close();

    for handle in handles {
        let lease = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(lease.is_none());
    }
    assert!(queue.enqueue(tasks(1).remove(0)).is_err());
}

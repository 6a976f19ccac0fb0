//! Bounded-concurrency admission gate for heavy transformations.
//!
//! One process-wide queue gates every heavy media step. Tasks wait for one of
//! `capacity` slots, run, and release the slot on the way out regardless of
//! outcome. Ordering is only approximately first-in-first-out: the semaphore
//! wakes waiters fairly but no strict submission-order guarantee is made, and
//! callers must not rely on one.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::config::WorkerCapacity;
use crate::error::ProcessingError;
use crate::metrics;

/// Snapshot of the queue's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Submissions waiting beyond the available slots.
    pub queued: usize,
    /// Submissions holding a slot.
    pub running: usize,
}

/// Gate limiting how many heavy transformations run at once.
pub struct AdmissionQueue {
    capacity: Option<usize>,
    permits: Option<Arc<Semaphore>>,
    submitted: AtomicUsize,
}

impl AdmissionQueue {
    /// Creates a queue with the given capacity. `Unbounded` disables gating
    /// entirely; tasks run immediately and are not counted.
    pub fn new(capacity: WorkerCapacity) -> Self {
        let capacity = capacity.resolve();
        match capacity {
            Some(n) => info!("admission queue gating at {n} slots"),
            None => info!("admission queue is unbounded"),
        }
        Self {
            capacity,
            permits: capacity.map(|n| Arc::new(Semaphore::new(n))),
            submitted: AtomicUsize::new(0),
        }
    }

    /// The configured slot count; `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Submits a task, waits for a free slot, runs it, and releases the slot
    /// whether the task succeeded or failed. The task's error is propagated
    /// unchanged.
    pub async fn enqueue<T, F>(&self, task: F) -> Result<T, ProcessingError>
    where
        F: Future<Output = Result<T, ProcessingError>>,
    {
        let Some(permits) = &self.permits else {
            return task.await;
        };

        self.submitted.fetch_add(1, Ordering::SeqCst);
        let _guard = SubmitGuard(self);
        self.publish_gauges();

        let _permit = permits
            .acquire()
            .await
            .map_err(|_| ProcessingError::internal("admission queue semaphore closed"))?;
        task.await
    }

    /// Current occupancy. For an unbounded queue both figures are zero.
    pub fn stats(&self) -> QueueStats {
        match self.capacity {
            None => QueueStats {
                queued: 0,
                running: 0,
            },
            Some(capacity) => {
                let submitted = self.submitted.load(Ordering::SeqCst);
                QueueStats {
                    queued: submitted.saturating_sub(capacity),
                    running: submitted.min(capacity),
                }
            }
        }
    }

    fn publish_gauges(&self) {
        let stats = self.stats();
        metrics::QUEUE_RUNNING.set(stats.running as i64);
        metrics::QUEUE_WAITING.set(stats.queued as i64);
    }
}

/// Decrements the submission count on every exit path, including task
/// errors and cancellation while waiting for a slot.
struct SubmitGuard<'a>(&'a AdmissionQueue);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.submitted.fetch_sub(1, Ordering::SeqCst);
        self.0.publish_gauges();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_enqueue_returns_task_result() {
        let queue = AdmissionQueue::new(WorkerCapacity::Fixed(2));
        let result = queue.enqueue(async { Ok::<_, ProcessingError>(41 + 1) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(queue.stats(), QueueStats { queued: 0, running: 0 });
    }

    #[tokio::test]
    async fn test_enqueue_propagates_error_and_releases_slot() {
        let queue = AdmissionQueue::new(WorkerCapacity::Fixed(1));
        let result: Result<(), _> = queue
            .enqueue(async { Err(ProcessingError::user_facing("nope")) })
            .await;
        assert!(result.is_err());
        assert_eq!(queue.stats(), QueueStats { queued: 0, running: 0 });

        // slot is reusable after the failure
        let ok = queue.enqueue(async { Ok::<_, ProcessingError>(()) }).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_running_never_exceeds_capacity() {
        let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Fixed(2)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let queue = Arc::clone(&queue);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ProcessingError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.stats(), QueueStats { queued: 0, running: 0 });
    }

    #[tokio::test]
    async fn test_unbounded_bypasses_gate() {
        let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Unbounded));
        assert_eq!(queue.capacity(), None);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        // no counting in unbounded mode
                        assert_eq!(queue.stats(), QueueStats { queued: 0, running: 0 });
                        Ok::<_, ProcessingError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_stats_reflect_waiting_submissions() {
        let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Fixed(1)));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(async {
                        tokio::time::sleep(Duration::from_millis(60)).await;
                        Ok::<_, ProcessingError>(())
                    })
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stats = queue.stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.queued, 2);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}

//! Admission queue integration tests.
//!
//! Verifies the concurrency bound, the occupancy figures, and the unbounded
//! bypass mode against wall-clock behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mediapress_core::config::WorkerCapacity;
use mediapress_core::error::ProcessingError;
use mediapress_core::queue::{AdmissionQueue, QueueStats};

fn sleeping_task(
    queue: Arc<AdmissionQueue>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    millis: u64,
) -> tokio::task::JoinHandle<Result<(), ProcessingError>> {
    tokio::spawn(async move {
        queue
            .enqueue(async {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await
    })
}

#[tokio::test]
async fn test_five_tasks_through_two_slots() {
    let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Fixed(2)));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            sleeping_task(
                Arc::clone(&queue),
                Arc::clone(&in_flight),
                Arc::clone(&peak),
                100,
            )
        })
        .collect();

    // halfway through the first batch: two hold slots, three wait
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        queue.stats(),
        QueueStats {
            queued: 3,
            running: 2
        }
    );

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2, "concurrency bound violated");
    assert_eq!(
        queue.stats(),
        QueueStats {
            queued: 0,
            running: 0
        }
    );
}

#[tokio::test]
async fn test_slots_are_released_by_failing_tasks() {
    let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Fixed(1)));

    for _ in 0..3 {
        let result: Result<(), _> = queue
            .enqueue(async { Err(ProcessingError::command_failed("ffmpeg", "bad input")) })
            .await;
        assert!(result.is_err());
    }

    // the slot is still usable after repeated failures
    let ok = queue.enqueue(async { Ok::<_, ProcessingError>(1) }).await;
    assert_eq!(ok.unwrap(), 1);
    assert_eq!(
        queue.stats(),
        QueueStats {
            queued: 0,
            running: 0
        }
    );
}

#[tokio::test]
async fn test_unbounded_runs_everything_at_once() {
    let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Unbounded));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let handles: Vec<_> = (0..5)
        .map(|_| {
            sleeping_task(
                Arc::clone(&queue),
                Arc::clone(&in_flight),
                Arc::clone(&peak),
                50,
            )
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // no gating: all five overlapped instead of running in series
    assert!(peak.load(Ordering::SeqCst) > 1);
    assert!(started.elapsed() < Duration::from_millis(250));
    // and nothing was counted
    assert_eq!(
        queue.stats(),
        QueueStats {
            queued: 0,
            running: 0
        }
    );
}

#[tokio::test]
async fn test_waiters_eventually_all_run() {
    let queue = Arc::new(AdmissionQueue::new(WorkerCapacity::Fixed(2)));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                queue
                    .enqueue(async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ProcessingError>(())
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(completed.load(Ordering::SeqCst), 10);
}

use crate::error::{EnrichError, Result};
use crate::geocode::GeocodeHit;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type GeocodeJob = Pin<Box<dyn Future<Output = Result<Option<GeocodeHit>>> + Send>>;

struct QueuedJob {
    job: GeocodeJob,
    done: oneshot::Sender<Result<Option<GeocodeHit>>>,
}

/// Serializes every outbound geocoding request system-wide: strict FIFO, one
/// request in flight at a time, and at least `min_interval` between the
/// completion of one request and the start of the next.
///
/// Constructed once per run and passed by reference into every producer;
/// tests instantiate independent queues with short intervals. Exactly one
/// worker loop exists per queue. It is spawned here and owns the pacing
/// clock, so concurrent `enqueue` calls can only ever line jobs up behind it.
pub struct GeocodeQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl GeocodeQueue {
    pub fn new(min_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();

        tokio::spawn(async move {
            let mut last_completed: Option<Instant> = None;
            while let Some(QueuedJob { job, done }) = rx.recv().await {
                if let Some(t) = last_completed {
                    let elapsed = t.elapsed();
                    if elapsed < min_interval {
                        tokio::time::sleep(min_interval - elapsed).await;
                    }
                }
                let result = job.await;
                // A failed request still used its time slot: it may well
                // have reached the server, so the clock advances regardless.
                last_completed = Some(Instant::now());
                if done.send(result).is_err() {
                    debug!("geocode job resolved after its caller went away");
                }
            }
        });

        Self { tx }
    }

    /// Queue one geocoding request. Resolves with the job's own result once
    /// its turn comes; a failing job resolves with its error without
    /// blocking anything queued behind it.
    pub async fn enqueue<F>(&self, job: F) -> Result<Option<GeocodeHit>>
    where
        F: Future<Output = Result<Option<GeocodeHit>>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(QueuedJob {
                job: Box::pin(job),
                done: done_tx,
            })
            .map_err(|_| EnrichError::Api {
                message: "geocode queue worker is gone".to_string(),
            })?;
        done_rx.await.map_err(|_| EnrichError::Api {
            message: "geocode queue dropped a pending job".to_string(),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_completions_are_spaced_by_min_interval() {
        let queue = GeocodeQueue::new(Duration::from_millis(50));
        let completions: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let completions = Arc::clone(&completions);
            queue
                .enqueue(async move {
                    completions.lock().unwrap().push(Instant::now());
                    Ok(None)
                })
                .await
                .unwrap();
        }

        let stamps = completions.lock().unwrap();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(45), "gap was {:?}", gap);
        }
    }

    #[tokio::test]
    async fn test_failed_job_resolves_error_and_does_not_block_queue() {
        let queue = GeocodeQueue::new(Duration::from_millis(10));

        let failed = queue
            .enqueue(async {
                Err(EnrichError::Api {
                    message: "boom".to_string(),
                })
            })
            .await;
        assert!(failed.is_err());

        let hit = queue
            .enqueue(async {
                Ok(Some(GeocodeHit {
                    lat: 1.0,
                    lng: 2.0,
                    address: Default::default(),
                }))
            })
            .await
            .unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_fifo_order_across_concurrent_producers() {
        let queue = Arc::new(GeocodeQueue::new(Duration::from_millis(5)));
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        // Enqueue from one task in submission order; completion order must match.
        let mut handles = Vec::new();
        for i in 0..4u32 {
            let queue = Arc::clone(&queue);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(async move {
                        order.lock().unwrap().push(i);
                        Ok(None)
                    })
                    .await
                    .unwrap();
            }));
            // Give each producer time to reach the queue before the next one.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }
}

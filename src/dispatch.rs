//! A fixed-size pool of warmed-up workers, fed one batch at a time.
//!
//! Each worker owns its own oracle (and so its own connection) and makes a
//! few throwaway requests before it accepts any work, so socket setup is
//! never charged to a real candidate. A batch is scattered across the
//! workers and `dispatch` only returns once every reply is in.
use crate::{
    calibration::random_token, judge, AttackError, DecisionPolicy, DispatchConfig, Measurement,
    Oracle, ResultSet, Threshold,
};

use futures::future::join_all;
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

use std::sync::Arc;

struct Job {
    candidate: String,
    reply: oneshot::Sender<Result<Measurement, AttackError>>,
}

pub struct WorkerPool {
    jobs: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `settings.workers` workers, each with an oracle from `connect`.
    /// Returns once every worker has finished warming up.
    pub async fn start<O, F>(
        settings: &DispatchConfig,
        threshold: Threshold,
        policy: DecisionPolicy,
        results: ResultSet,
        connect: F,
    ) -> Result<Self, AttackError>
    where
        O: Oracle + 'static,
        F: Fn() -> Result<O, AttackError>,
    {
        let n_workers = settings.workers.max(1);
        let (jobs, queue) = mpsc::channel::<Job>(n_workers);
        let queue = Arc::new(Mutex::new(queue));

        let mut workers = Vec::with_capacity(n_workers);
        let mut ready = Vec::with_capacity(n_workers);
        for id in 0..n_workers {
            let oracle = connect()?;
            let (ready_tx, ready_rx) = oneshot::channel();
            let worker = Worker {
                id,
                oracle,
                threshold,
                policy,
                results: results.clone(),
                queue: Arc::clone(&queue),
            };
            workers.push(tokio::spawn(worker.run(settings.warmup_requests, ready_tx)));
            ready.push(ready_rx);
        }

        let pool = Self { jobs, workers };
        for (id, ready) in join_all(ready).await.into_iter().enumerate() {
            match ready {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    pool.shutdown().await;
                    return Err(AttackError::WarmUp {
                        worker: id,
                        source: Box::new(e),
                    });
                }
                Err(_) => {
                    pool.shutdown().await;
                    return Err(AttackError::WorkerLost);
                }
            }
        }
        info!(workers = n_workers, "worker pool warmed up");
        Ok(pool)
    }

    /// Judge every candidate of `batch` and wait for all of them. Results
    /// come back in batch order.
    pub async fn dispatch(&self, batch: Vec<String>) -> Result<Vec<Measurement>, AttackError> {
        let mut replies = Vec::with_capacity(batch.len());
        for candidate in batch {
            let (reply, reply_rx) = oneshot::channel();
            self.jobs
                .send(Job { candidate, reply })
                .await
                .map_err(|_| AttackError::WorkerLost)?;
            replies.push(reply_rx);
        }

        join_all(replies)
            .await
            .into_iter()
            .map(|reply| reply.unwrap_or_else(|_| Err(AttackError::WorkerLost)))
            .collect()
    }

    /// Close the queue and wait for every worker to exit.
    pub async fn shutdown(self) {
        drop(self.jobs);
        for worker in join_all(self.workers).await {
            if let Err(e) = worker {
                debug!("worker exited abnormally: {e}");
            }
        }
    }
}

struct Worker<O> {
    id: usize,
    oracle: O,
    threshold: Threshold,
    policy: DecisionPolicy,
    results: ResultSet,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl<O: Oracle> Worker<O> {
    async fn run(self, warmup_requests: usize, ready: oneshot::Sender<Result<(), AttackError>>) {
        let warm = self.warm_up(warmup_requests).await;
        let failed = warm.is_err();
        if ready.send(warm).is_err() || failed {
            return;
        }

        loop {
            let job = self.queue.lock().await.recv().await;
            let Some(Job { candidate, reply }) = job else {
                break;
            };
            let measurement = judge(&self.oracle, candidate, &self.threshold, &self.policy).await;
            if let Ok(m) = &measurement {
                if m.is_confirmed() {
                    self.results.push(m.candidate.clone());
                }
            }
            // The dispatcher only goes away when the run is aborting.
            let _ = reply.send(measurement);
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn warm_up(&self, requests: usize) -> Result<(), AttackError> {
        for _ in 0..requests {
            self.oracle.measure(&random_token()).await?;
        }
        debug!(worker = self.id, requests, "worker warmed up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{RequestErrorPolicy, SimulatedOracle};

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn simulated() -> SimulatedOracle {
        SimulatedOracle::new("ab", Duration::from_millis(50), Duration::from_millis(40))
    }

    fn threshold() -> Threshold {
        Threshold::from_baseline(Duration::from_millis(50), 0.5)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_warm_up_exactly_once() {
        let oracle = simulated();
        let connections = AtomicUsize::new(0);
        let settings = DispatchConfig {
            batch_size: 4,
            workers: 4,
            warmup_requests: 3,
        };
        let pool = WorkerPool::start(
            &settings,
            threshold(),
            DecisionPolicy::default(),
            ResultSet::default(),
            || {
                connections.fetch_add(1, Ordering::SeqCst);
                Ok(oracle.clone())
            },
        )
        .await
        .unwrap();
        assert_eq!(oracle.requests(), 4 * 3);

        for _ in 0..3 {
            let batch = vec!["zz".to_string(); 4];
            pool.dispatch(batch).await.unwrap();
        }
        pool.shutdown().await;

        assert_eq!(connections.load(Ordering::SeqCst), 4);
        // Warm-up plus one screening request per candidate, nothing re-sampled.
        assert_eq!(oracle.requests(), 4 * 3 + 3 * 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dispatch_returns_measurements_in_batch_order() {
        let results = ResultSet::default();
        let settings = DispatchConfig {
            workers: 3,
            warmup_requests: 0,
            ..Default::default()
        };
        let pool = WorkerPool::start(
            &settings,
            threshold(),
            DecisionPolicy::default(),
            results.clone(),
            || Ok(simulated()),
        )
        .await
        .unwrap();
        let batch: Vec<String> = ["aa", "ab", "ba", "bb", "ac"]
            .into_iter()
            .map(String::from)
            .collect();

        let measurements = pool.dispatch(batch.clone()).await.unwrap();
        pool.shutdown().await;

        let candidates: Vec<String> = measurements.iter().map(|m| m.candidate.clone()).collect();
        assert_eq!(candidates, batch);
        let mut confirmed = results.into_vec();
        confirmed.sort();
        assert_eq!(confirmed, vec!["aa", "ab", "ac"]);
    }

    #[tokio::test]
    async fn warm_up_failure_is_fatal() {
        let settings = DispatchConfig {
            workers: 2,
            warmup_requests: 1,
            ..Default::default()
        };

        let result = WorkerPool::start(
            &settings,
            threshold(),
            DecisionPolicy::default(),
            ResultSet::default(),
            || crate::HttpOracle::new("http://127.0.0.1:9/vulnerable", ".", None),
        )
        .await;

        assert!(matches!(result, Err(AttackError::WarmUp { .. })));
    }

    #[tokio::test]
    async fn request_error_propagates_from_dispatch() {
        let settings = DispatchConfig {
            workers: 1,
            warmup_requests: 0,
            ..Default::default()
        };
        let pool = WorkerPool::start(
            &settings,
            threshold(),
            DecisionPolicy {
                confirmation_samples: 1,
                on_request_error: RequestErrorPolicy::Abort,
            },
            ResultSet::default(),
            || crate::HttpOracle::new("http://127.0.0.1:9/vulnerable", ".", None),
        )
        .await
        .unwrap();

        let result = pool.dispatch(vec!["aa".to_string()]).await;
        pool.shutdown().await;

        assert!(result.unwrap_err().is_connectivity());
    }
}

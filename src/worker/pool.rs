//! A fixed set of worker tasks draining the job queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::worker::task::{JobEnvelope, JobHandler, JobOutcome};

/// Pool sizing and retry policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after.
    pub retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.workers` tasks sharing `rx`.
    ///
    /// Failed jobs are put back on the queue through `requeue` after a
    /// backoff. The pool stops once every strong sender of the queue is gone.
    pub fn spawn(
        handler: Arc<dyn JobHandler>,
        rx: mpsc::Receiver<JobEnvelope>,
        requeue: mpsc::WeakSender<JobEnvelope>,
        config: PoolConfig,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let count = config.workers.max(1);
        let handles = (0..count)
            .map(|worker_id| {
                let runner = Runner {
                    worker_id,
                    handler: handler.clone(),
                    rx: rx.clone(),
                    requeue: requeue.clone(),
                    config: config.clone(),
                };
                tokio::spawn(runner.run())
            })
            .collect();
        tracing::info!(workers = count, max_attempts = config.max_attempts, "Worker pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to drain the queue and exit.
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }

    /// Stop all workers immediately.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

struct Runner {
    worker_id: usize,
    handler: Arc<dyn JobHandler>,
    rx: Arc<Mutex<mpsc::Receiver<JobEnvelope>>>,
    requeue: mpsc::WeakSender<JobEnvelope>,
    config: PoolConfig,
}

impl Runner {
    async fn run(self) {
        loop {
            let next = self.rx.lock().await.recv().await;
            let Some(envelope) = next else {
                tracing::debug!(worker_id = self.worker_id, "Job queue closed, worker exiting");
                return;
            };
            self.process(envelope).await;
        }
    }

    async fn process(&self, envelope: JobEnvelope) {
        let waited_ms = (chrono::Utc::now() - envelope.enqueued_at).num_milliseconds();
        tracing::debug!(
            worker_id = self.worker_id,
            job_id = %envelope.id,
            kind = envelope.job.kind(),
            attempt = envelope.attempt,
            waited_ms,
            "Job picked up"
        );

        match self.handler.handle(&envelope.job).await {
            Ok(JobOutcome::Applied) => {
                tracing::debug!(job_id = %envelope.id, user_key = envelope.job.user_key(), "Job applied");
            }
            Ok(JobOutcome::Skipped(reason)) => {
                tracing::info!(
                    job_id = %envelope.id,
                    user_key = envelope.job.user_key(),
                    reason,
                    "Job skipped"
                );
            }
            Err(e) if envelope.attempt >= self.config.max_attempts => {
                let exhausted = JobError::Exhausted {
                    id: envelope.id,
                    attempts: envelope.attempt,
                };
                tracing::error!(
                    user_key = envelope.job.user_key(),
                    kind = envelope.job.kind(),
                    error = %e,
                    "{exhausted}"
                );
            }
            Err(e) => {
                let delay = backoff(self.config.retry_backoff, envelope.attempt);
                tracing::warn!(
                    job_id = %envelope.id,
                    attempt = envelope.attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Job failed, scheduling retry"
                );
                self.schedule_retry(envelope.next_attempt(), delay);
            }
        }
    }

    fn schedule_retry(&self, envelope: JobEnvelope, delay: Duration) {
        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(tx) = requeue.upgrade() else {
                tracing::warn!(job_id = %envelope.id, "Job queue closed, dropping retry");
                return;
            };
            let id = envelope.id;
            if tx.send(envelope).await.is_err() {
                tracing::warn!(job_id = %id, "Job queue closed, dropping retry");
            }
        });
    }
}

/// Backoff before the attempt following `attempt` (1-based).
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(16))
}

//! Hands jobs to the worker pool without waiting for them.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::JobError;
use crate::worker::task::{Job, JobEnvelope};

/// Fire-and-forget job submission.
pub trait JobDispatcher: Send + Sync {
    /// Queue `job` and return its id. Never waits for the job to run.
    fn dispatch(&self, job: Job) -> Result<Uuid, JobError>;
}

/// Bounded in-process queue feeding a [`WorkerPool`](crate::worker::WorkerPool).
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::Sender<JobEnvelope>,
    capacity: usize,
}

/// Create a dispatcher and the receiving end for the pool.
pub fn job_queue(capacity: usize) -> (QueueDispatcher, mpsc::Receiver<JobEnvelope>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (QueueDispatcher { tx, capacity }, rx)
}

impl QueueDispatcher {
    /// A sender that does not keep the queue open, used for retries.
    pub fn downgrade(&self) -> mpsc::WeakSender<JobEnvelope> {
        self.tx.downgrade()
    }

    /// Effective queue bound; a configured 0 is raised to 1.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl JobDispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job) -> Result<Uuid, JobError> {
        let envelope = JobEnvelope::new(job);
        let id = envelope.id;
        let kind = envelope.job.kind();
        let user_key = envelope.job.user_key().to_string();

        self.tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => JobError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => JobError::QueueClosed,
        })?;

        tracing::debug!(job_id = %id, kind, user_key = %user_key, "Job queued");
        Ok(id)
    }
}

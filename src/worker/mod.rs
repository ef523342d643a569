//! Background generation.
//!
//! - `task`: job types and the `JobHandler` seam
//! - `dispatcher`: bounded queue the request handler submits to
//! - `worker`: question and feedback generation against the state store
//! - `pool`: worker tasks with retry and backoff

pub mod dispatcher;
pub mod pool;
pub mod task;
pub mod worker;

pub use dispatcher::{JobDispatcher, QueueDispatcher, job_queue};
pub use pool::{PoolConfig, WorkerPool};
pub use task::{Job, JobEnvelope, JobHandler, JobOutcome};
pub use worker::GenerationWorker;

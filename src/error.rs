//! Error types for the interview coach.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Generation error: {0}")]
    Llm(#[from] LlmError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// State store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Could not open database: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Could not encode record: {0}")]
    Serialization(String),

    /// The stored record was written by someone else since it was read.
    #[error("Write conflict for {key}: expected version {expected}")]
    Conflict { key: String, expected: u64 },

    /// The stored record cannot be decoded into a valid conversation.
    #[error("Corrupted record for {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

impl DatabaseError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Sending through {name} failed: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Media handling through {name} failed: {reason}")]
    MediaFailed { name: String, reason: String },
}

/// Generation capability errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Unusable reply from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} gave no reply within {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Job submission and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job {id} gave up after {attempts} attempts")]
    Exhausted { id: Uuid, attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

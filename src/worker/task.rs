//! Background job types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::JobRequest;
use crate::error::Error;

/// A unit of background generation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    GenerateQuestions {
        user_key: String,
        session_id: Uuid,
        context: String,
    },
    /// Reads context, questions and answers from the stored record when it runs.
    GenerateFeedback { user_key: String, session_id: Uuid },
}

impl Job {
    /// Bind a transition's job request to the conversation that asked for it.
    pub fn from_request(user_key: &str, session_id: Uuid, request: JobRequest) -> Self {
        match request {
            JobRequest::GenerateQuestions { context } => Self::GenerateQuestions {
                user_key: user_key.to_string(),
                session_id,
                context,
            },
            JobRequest::GenerateFeedback => Self::GenerateFeedback {
                user_key: user_key.to_string(),
                session_id,
            },
        }
    }

    pub fn user_key(&self) -> &str {
        match self {
            Self::GenerateQuestions { user_key, .. } | Self::GenerateFeedback { user_key, .. } => {
                user_key
            }
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            Self::GenerateQuestions { session_id, .. }
            | Self::GenerateFeedback { session_id, .. } => *session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerateQuestions { .. } => "generate_questions",
            Self::GenerateFeedback { .. } => "generate_feedback",
        }
    }
}

/// A job as it travels through the queue.
#[derive(Debug, Clone)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub job: Job,
    /// 1 on first delivery.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// The same job, queued again for its next attempt.
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self.enqueued_at = Utc::now();
        self
    }
}

/// What running a job did to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The record was updated with the job's result.
    Applied,
    /// Nothing to do: the record is gone, was reset, or already has a result.
    Skipped(&'static str),
}

/// Executes jobs pulled off the queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// An `Err` is transient and makes the pool retry the job.
    async fn handle(&self, job: &Job) -> Result<JobOutcome, Error>;
}

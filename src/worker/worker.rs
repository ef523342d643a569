//! Question and feedback generation.
//!
//! A worker never advances the conversation on its own. It writes its result
//! (or a user-facing error) onto the record and lets the next inbound turn
//! pick it up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::conversation::{ConversationRecord, Step, prompts};
use crate::error::{DatabaseError, Error, LlmError};
use crate::llm::LlmProvider;
use crate::store::StateStore;
use crate::worker::task::{Job, JobHandler, JobOutcome};

/// Attempts at writing a result before handing the job back to the pool.
const WRITE_ATTEMPTS: u32 = 3;

/// Shared dependencies for generation jobs.
pub struct GenerationWorker {
    store: Arc<dyn StateStore>,
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl GenerationWorker {
    pub fn new(store: Arc<dyn StateStore>, llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            store,
            llm,
            timeout,
        }
    }

    async fn generate_questions(
        &self,
        user_key: &str,
        session_id: Uuid,
        context: &str,
    ) -> Result<JobOutcome, Error> {
        let guard = Guard {
            session_id,
            step: Step::PreparingQuestions,
        };
        match self.store.get(user_key).await? {
            None => return Ok(JobOutcome::Skipped("record missing")),
            Some(record) => {
                if let Some(reason) = guard.check(&record) {
                    return Ok(JobOutcome::Skipped(reason));
                }
            }
        }

        let generated = match self.complete(&prompts::questions_prompt(context)).await {
            Ok(raw) => prompts::parse_questions(&raw),
            Err(e) => Err(e.to_string()),
        };

        match generated {
            Ok(questions) => {
                let outcome = self
                    .write(user_key, guard, |record| {
                        record.questions = questions.clone();
                        record.answers.clear();
                        record.questions_ready = true;
                        record.generation_error = None;
                    })
                    .await?;
                if outcome == JobOutcome::Applied {
                    tracing::info!(user_key, "Interview questions ready");
                }
                Ok(outcome)
            }
            Err(reason) => {
                tracing::warn!(user_key, %reason, "Question generation failed");
                self.write(user_key, guard, |record| {
                    record.step = Step::AwaitingContext;
                    record.context = None;
                    record.questions_ready = false;
                    record.generation_error = Some(prompts::GENERATION_FAILED.to_string());
                })
                .await
            }
        }
    }

    async fn generate_feedback(
        &self,
        user_key: &str,
        session_id: Uuid,
    ) -> Result<JobOutcome, Error> {
        let guard = Guard {
            session_id,
            step: Step::GeneratingFeedback,
        };
        let record = match self.store.get(user_key).await? {
            None => return Ok(JobOutcome::Skipped("record missing")),
            Some(record) => record,
        };
        if let Some(reason) = guard.check(&record) {
            return Ok(JobOutcome::Skipped(reason));
        }

        if !record.is_complete_interview() {
            tracing::warn!(
                user_key,
                questions = record.questions.len(),
                answers = record.answers.len(),
                "Interview data incomplete, skipping feedback generation"
            );
            return self
                .write(user_key, guard, |record| {
                    record.feedback_error = Some(prompts::FEEDBACK_INCOMPLETE.to_string());
                })
                .await;
        }

        let prompt = prompts::feedback_prompt(
            record.context.as_deref().unwrap_or_default(),
            &record.questions,
            &record.answers,
        );

        match self.complete(&prompt).await {
            Ok(feedback) => {
                let feedback = feedback.trim().to_string();
                let outcome = self
                    .write(user_key, guard, |record| {
                        record.feedback_text = Some(feedback.clone());
                    })
                    .await?;
                if outcome == JobOutcome::Applied {
                    tracing::info!(user_key, action = "interview_completed", "Feedback ready");
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(user_key, error = %e, "Feedback generation failed");
                self.write(user_key, guard, |record| {
                    record.feedback_error = Some(prompts::FEEDBACK_FAILED.to_string());
                })
                .await
            }
        }
    }

    /// Call the model, bounded by the configured timeout.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.llm.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Re-read the record, re-check the guard and apply `mutate`, retrying
    /// on write conflicts.
    async fn write<F>(&self, user_key: &str, guard: Guard, mutate: F) -> Result<JobOutcome, Error>
    where
        F: Fn(&mut ConversationRecord),
    {
        let mut expected = 0;
        for attempt in 1..=WRITE_ATTEMPTS {
            let Some(mut record) = self.store.get(user_key).await? else {
                return Ok(JobOutcome::Skipped("record missing"));
            };
            if let Some(reason) = guard.check(&record) {
                return Ok(JobOutcome::Skipped(reason));
            }

            expected = record.version;
            mutate(&mut record);
            match self.store.set(&record).await {
                Ok(_) => return Ok(JobOutcome::Applied),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(user_key, attempt, "Conversation changed under job, retrying write");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DatabaseError::Conflict {
            key: user_key.to_string(),
            expected,
        }
        .into())
    }
}

#[async_trait]
impl JobHandler for GenerationWorker {
    async fn handle(&self, job: &Job) -> Result<JobOutcome, Error> {
        match job {
            Job::GenerateQuestions {
                user_key,
                session_id,
                context,
            } => self.generate_questions(user_key, *session_id, context).await,
            Job::GenerateFeedback {
                user_key,
                session_id,
            } => self.generate_feedback(user_key, *session_id).await,
        }
    }
}

/// Conditions under which a job's result still belongs on the record.
#[derive(Clone, Copy)]
struct Guard {
    session_id: Uuid,
    step: Step,
}

impl Guard {
    fn check(&self, record: &ConversationRecord) -> Option<&'static str> {
        if record.session_id != self.session_id {
            return Some("conversation was reset");
        }
        if record.step != self.step {
            return Some("conversation moved on");
        }
        let done = match self.step {
            Step::PreparingQuestions => record.questions_ready,
            _ => record.feedback_text.is_some() || record.feedback_error.is_some(),
        };
        done.then_some("result already present")
    }
}

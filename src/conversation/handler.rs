//! One inbound message, end to end.
//!
//! The handler loads the user's record, applies the transition, writes the
//! result and only then starts whatever background work the transition asked
//! for. Write conflicts with a generation worker replay the whole turn on
//! top of the worker's write.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::MessageSender;
use crate::conversation::machine::{self, JobRequest};
use crate::conversation::{ConversationRecord, Step, keywords, prompts};
use crate::error::{DatabaseError, Error, Result};
use crate::store::StateStore;
use crate::worker::{Job, JobDispatcher};

/// Attempts at applying one turn before giving up on write conflicts.
const TURN_ATTEMPTS: u32 = 3;

/// Attempts at follow-up writes made after the turn itself was stored.
const FOLLOW_UP_ATTEMPTS: u32 = 3;

pub struct ConversationHandler {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    sender: Arc<dyn MessageSender>,
}

/// The turn as it was committed.
struct Committed {
    record: ConversationRecord,
    replies: Vec<String>,
    dispatch: Option<JobRequest>,
}

impl ConversationHandler {
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            sender,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Process one message from `user_key` and return the replies to send
    /// back, in order.
    pub async fn handle_message(&self, user_key: &str, text: &str) -> Result<Vec<String>> {
        let input = text.trim();

        let mut attempt = 1;
        let committed = loop {
            match self.apply_turn(user_key, input).await {
                Ok(committed) => break committed,
                Err(Error::Database(e)) if e.is_conflict() && attempt < TURN_ATTEMPTS => {
                    debug!(user_key, attempt, "Conversation changed during turn, replaying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let Committed {
            record,
            replies,
            dispatch,
        } = committed;

        if let Some(request) = dispatch {
            self.dispatch(&record, request).await;
        }
        if record.questions_ready && record.step == Step::AwaitingAnswer1 {
            self.push_first_question(&record).await;
        }

        Ok(replies)
    }

    /// Read, transition and write. Returns `Conflict` if the record changed
    /// underneath; nothing has been committed in that case.
    async fn apply_turn(&self, user_key: &str, input: &str) -> Result<Committed> {
        let mut replies = Vec::new();
        let mut record = match self.store.get(user_key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(user_key, action = "new_user_detected", "New conversation");
                ConversationRecord::new(user_key)
            }
            Err(DatabaseError::Corrupted { reason, .. }) => {
                warn!(user_key, %reason, "Unreadable conversation state, starting over");
                self.store.delete(user_key).await?;
                replies.push(prompts::CORRUPTED_STATE.to_string());
                ConversationRecord::new(user_key)
            }
            Err(e) => return Err(e.into()),
        };

        if keywords::is_reset(input) {
            info!(user_key, from = %record.step, "User restarted the conversation");
            record.reset();
        }

        let previous = record.step;
        record.last_seen_at = Some(Utc::now());
        let transition = machine::transition(&mut record, input);
        replies.push(transition.reply);

        debug!(user_key, from = %previous, to = %record.step, "Transition applied");
        log_milestones(&record, previous);

        if record.step.is_terminal() {
            self.store.delete(user_key).await?;
            info!(user_key, "Conversation finished, state removed");
        } else {
            record.version = self.store.set(&record).await?;
        }

        Ok(Committed {
            record,
            replies,
            dispatch: transition.dispatch,
        })
    }

    async fn dispatch(&self, record: &ConversationRecord, request: JobRequest) {
        let job = Job::from_request(&record.user_key, record.session_id, request);
        let kind = job.kind();
        let user_key = record.user_key.as_str();

        match self.dispatcher.dispatch(job) {
            Ok(job_id) => info!(user_key, %job_id, kind, "Generation job dispatched"),
            Err(e) => {
                error!(user_key, kind, error = %e, "Failed to dispatch generation job");
                let step = record.step;
                self.follow_up(user_key, record.session_id, step, |record| match step {
                    Step::PreparingQuestions => {
                        record.generation_error =
                            Some(prompts::GENERATION_DISPATCH_FAILED.to_string());
                    }
                    _ => {
                        record.feedback_error =
                            Some(prompts::FEEDBACK_DISPATCH_FAILED.to_string());
                    }
                })
                .await;
            }
        }
    }

    async fn push_first_question(&self, record: &ConversationRecord) {
        let user_key = record.user_key.as_str();
        let Some(question) = record.question(0) else {
            return;
        };

        let text = prompts::question_message(1, question);
        if let Err(e) = self.sender.send(user_key, &text).await {
            // The flag stays set; the next turn tries again.
            error!(user_key, channel = self.sender.name(), error = %e, "Failed to push first question");
            return;
        }
        info!(user_key, "First question delivered");

        self.follow_up(user_key, record.session_id, Step::AwaitingAnswer1, |record| {
            record.questions_ready = false;
        })
        .await;
    }

    /// Apply a small update to an already committed turn.
    ///
    /// Skipped if the conversation was reset or moved to another step in
    /// the meantime. Failures are logged; the turn itself already succeeded.
    async fn follow_up<F>(&self, user_key: &str, session_id: Uuid, step: Step, mutate: F)
    where
        F: Fn(&mut ConversationRecord),
    {
        for attempt in 1..=FOLLOW_UP_ATTEMPTS {
            let mut record = match self.store.get(user_key).await {
                Ok(Some(record)) if record.session_id == session_id && record.step == step => record,
                Ok(_) => return,
                Err(e) => {
                    error!(user_key, error = %e, "Follow-up update could not read state");
                    return;
                }
            };
            mutate(&mut record);
            match self.store.set(&record).await {
                Ok(_) => return,
                Err(e) if e.is_conflict() => {
                    debug!(user_key, attempt, "Follow-up update conflicted, retrying");
                }
                Err(e) => {
                    error!(user_key, error = %e, "Follow-up update failed");
                    return;
                }
            }
        }
        warn!(user_key, "Follow-up update gave up after repeated conflicts");
    }
}

fn log_milestones(record: &ConversationRecord, previous: Step) {
    let user_key = record.user_key.as_str();
    match (previous, record.step) {
        (Step::AwaitingContext, Step::PreparingQuestions) => {
            info!(user_key, action = "interview_started", "Interview started");
        }
        (Step::AwaitingProEmail, Step::Finished) => {
            if record.pro_email.is_some() {
                info!(user_key, action = "pro_email_collected", "PRO waitlist e-mail collected");
            } else {
                info!(user_key, action = "pro_version_declined", "PRO offer declined");
            }
            info!(user_key, action = "user_cycle_completed", "User completed the full cycle");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ChannelError, JobError};
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingDispatcher {
        jobs: Mutex<Vec<Job>>,
        fail: bool,
    }

    impl JobDispatcher for RecordingDispatcher {
        fn dispatch(&self, job: Job) -> std::result::Result<Uuid, JobError> {
            if self.fail {
                return Err(JobError::QueueClosed);
            }
            self.jobs.lock().unwrap().push(job);
            Ok(Uuid::new_v4())
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, user_key: &str, text: &str) -> std::result::Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "recording".into(),
                    reason: "offline".into(),
                });
            }
            self.sent.lock().unwrap().push((user_key.into(), text.into()));
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        dispatcher: Arc<RecordingDispatcher>,
        sender: Arc<RecordingSender>,
        handler: ConversationHandler,
    }

    fn harness_with(dispatcher: RecordingDispatcher, sender: RecordingSender) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(dispatcher);
        let sender = Arc::new(sender);
        let handler = ConversationHandler::new(store.clone(), dispatcher.clone(), sender.clone());
        Harness {
            store,
            dispatcher,
            sender,
            handler,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingDispatcher::default(), RecordingSender::default())
    }

    const USER: &str = "whatsapp:+5511912345678";

    async fn seed(store: &MemoryStore, build: impl FnOnce(&mut ConversationRecord)) -> ConversationRecord {
        let mut record = ConversationRecord::new(USER);
        build(&mut record);
        record.version = store.set(&record).await.unwrap();
        record
    }

    fn three_questions(record: &mut ConversationRecord) {
        record.context = Some("Dev Python".into());
        record.questions = vec!["Q1?".into(), "Q2?".into(), "Q3?".into()];
    }

    #[tokio::test]
    async fn first_message_onboards() {
        let h = harness();
        let replies = h.handler.handle_message(USER, "oi").await.unwrap();
        assert_eq!(replies, vec![prompts::ONBOARDING]);

        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert_eq!(stored.step, Step::AwaitingContext);
        assert!(stored.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn context_dispatches_questions_job_after_write() {
        let h = harness();
        let record = seed(&h.store, |r| r.step = Step::AwaitingContext).await;

        let replies = h
            .handler
            .handle_message(USER, "  Sou dev Python, 3 anos ")
            .await
            .unwrap();
        assert_eq!(replies, vec![prompts::CONTEXT_RECEIVED]);

        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert_eq!(stored.step, Step::PreparingQuestions);

        let jobs = h.dispatcher.jobs.lock().unwrap();
        assert_eq!(
            *jobs,
            vec![Job::GenerateQuestions {
                user_key: USER.into(),
                session_id: record.session_id,
                context: "Sou dev Python, 3 anos".into(),
            }]
        );
    }

    #[tokio::test]
    async fn dispatch_failure_surfaces_on_next_turn() {
        let h = harness_with(
            RecordingDispatcher {
                fail: true,
                ..Default::default()
            },
            RecordingSender::default(),
        );
        seed(&h.store, |r| r.step = Step::AwaitingContext).await;

        h.handler.handle_message(USER, "Sou dev Go").await.unwrap();
        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert_eq!(
            stored.generation_error.as_deref(),
            Some(prompts::GENERATION_DISPATCH_FAILED)
        );

        let replies = h.handler.handle_message(USER, "estou pronto").await.unwrap();
        assert_eq!(replies, vec![prompts::GENERATION_DISPATCH_FAILED]);
        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert_eq!(stored.step, Step::AwaitingContext);
        assert!(stored.context.is_none());
    }

    #[tokio::test]
    async fn ready_without_questions_keeps_state() {
        let h = harness();
        seed(&h.store, |r| {
            r.step = Step::PreparingQuestions;
            r.context = Some("ctx".into());
        })
        .await;

        let replies = h.handler.handle_message(USER, "estou pronto").await.unwrap();
        assert_eq!(replies, vec![prompts::ALMOST_READY]);
        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert_eq!(stored.step, Step::PreparingQuestions);
        assert_eq!(stored.context.as_deref(), Some("ctx"));
    }

    #[tokio::test]
    async fn undelivered_first_question_is_pushed_once() {
        let h = harness();
        seed(&h.store, |r| {
            three_questions(r);
            r.step = Step::AwaitingAnswer1;
            r.questions_ready = true;
        })
        .await;

        let replies = h.handler.handle_message(USER, "oi?").await.unwrap();
        assert_eq!(replies, vec![prompts::FIRST_QUESTION_ON_ITS_WAY]);

        let sent = h.sender.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(USER.to_string(), "*Pergunta 1:*\nQ1?".to_string())]);

        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert!(!stored.questions_ready);
        assert!(stored.answers.is_empty());

        // Now the answer is recorded normally.
        let replies = h.handler.handle_message(USER, "Minha resposta").await.unwrap();
        assert_eq!(replies, vec!["*Pergunta 2:*\nQ2?".to_string()]);
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_push_keeps_flag() {
        let h = harness_with(
            RecordingDispatcher::default(),
            RecordingSender {
                fail: true,
                ..Default::default()
            },
        );
        seed(&h.store, |r| {
            three_questions(r);
            r.step = Step::AwaitingAnswer1;
            r.questions_ready = true;
        })
        .await;

        h.handler.handle_message(USER, "oi?").await.unwrap();
        assert!(h.store.get(USER).await.unwrap().unwrap().questions_ready);
    }

    #[tokio::test]
    async fn last_answer_dispatches_feedback() {
        let h = harness();
        let record = seed(&h.store, |r| {
            three_questions(r);
            r.answers = vec!["a1".into(), "a2".into()];
            r.step = Step::AwaitingAnswer3;
        })
        .await;

        let replies = h.handler.handle_message(USER, "a3").await.unwrap();
        assert_eq!(replies, vec![prompts::ANSWERS_RECEIVED]);
        assert_eq!(
            *h.dispatcher.jobs.lock().unwrap(),
            vec![Job::GenerateFeedback {
                user_key: USER.into(),
                session_id: record.session_id,
            }]
        );
    }

    #[tokio::test]
    async fn invalid_email_keeps_record() {
        let h = harness();
        seed(&h.store, |r| r.step = Step::AwaitingProEmail).await;

        let replies = h.handler.handle_message(USER, "not-an-email").await.unwrap();
        assert_eq!(replies, vec![prompts::EMAIL_INVALID]);
        assert_eq!(
            h.store.get(USER).await.unwrap().unwrap().step,
            Step::AwaitingProEmail
        );
    }

    #[tokio::test]
    async fn decline_finishes_and_deletes() {
        let h = harness();
        seed(&h.store, |r| r.step = Step::AwaitingProEmail).await;

        let replies = h.handler.handle_message(USER, "finalizar").await.unwrap();
        assert_eq!(replies, vec![prompts::PRO_DECLINED]);
        assert!(h.store.get(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_from_any_step_starts_fresh() {
        for step in Step::ALL {
            let h = harness();
            let old = seed(&h.store, |r| {
                three_questions(r);
                r.step = step;
            })
            .await;

            let replies = h.handler.handle_message(USER, "Reiniciar").await.unwrap();
            assert_eq!(replies, vec![prompts::ONBOARDING], "from {step}");

            let stored = h.store.get(USER).await.unwrap().unwrap();
            assert_eq!(stored.step, Step::AwaitingContext);
            assert!(stored.context.is_none());
            assert!(stored.questions.is_empty());
            assert_ne!(stored.session_id, old.session_id);
        }
    }

    #[tokio::test]
    async fn corrupted_record_is_replaced() {
        let h = harness();
        h.store.insert_raw(USER, "{not json").await;

        let replies = h.handler.handle_message(USER, "oi").await.unwrap();
        assert_eq!(replies, vec![prompts::CORRUPTED_STATE, prompts::ONBOARDING]);
        let stored = h.store.get(USER).await.unwrap().unwrap();
        assert_eq!(stored.step, Step::AwaitingContext);
    }

    #[tokio::test]
    async fn unknown_step_counts_as_corruption() {
        let h = harness();
        let raw = format!(
            r#"{{"user_key":"{USER}","session_id":"{}","step":"aguardando_resposta_9"}}"#,
            Uuid::new_v4()
        );
        h.store.insert_raw(USER, raw).await;

        let replies = h.handler.handle_message(USER, "oi").await.unwrap();
        assert_eq!(replies[0], prompts::CORRUPTED_STATE);
    }

    /// Lets a "worker" write land between the handler's read and write.
    struct InterleavingStore {
        inner: MemoryStore,
        pending: Mutex<Option<ConversationRecord>>,
    }

    #[async_trait]
    impl StateStore for InterleavingStore {
        async fn get(
            &self,
            user_key: &str,
        ) -> std::result::Result<Option<ConversationRecord>, DatabaseError> {
            self.inner.get(user_key).await
        }

        async fn set(&self, record: &ConversationRecord) -> std::result::Result<u64, DatabaseError> {
            let pending = self.pending.lock().unwrap().take();
            if let Some(mut worker_write) = pending {
                let current = self.inner.get(&record.user_key).await?.unwrap();
                worker_write.version = current.version;
                self.inner.set(&worker_write).await?;
            }
            self.inner.set(record).await
        }

        async fn delete(&self, user_key: &str) -> std::result::Result<bool, DatabaseError> {
            self.inner.delete(user_key).await
        }
    }

    #[tokio::test]
    async fn conflicting_worker_write_is_not_lost() {
        let store = Arc::new(InterleavingStore {
            inner: MemoryStore::new(),
            pending: Mutex::new(None),
        });
        let mut record = ConversationRecord::new(USER);
        record.step = Step::PreparingQuestions;
        record.context = Some("ctx".into());
        record.version = store.set(&record).await.unwrap();

        // The worker finishes while the handler processes "hmm".
        let mut worker_write = record.clone();
        three_questions(&mut worker_write);
        worker_write.questions_ready = true;
        *store.pending.lock().unwrap() = Some(worker_write);

        let handler = ConversationHandler::new(
            store.clone(),
            Arc::new(RecordingDispatcher::default()),
            Arc::new(RecordingSender::default()),
        );
        let replies = handler.handle_message(USER, "hmm").await.unwrap();
        assert_eq!(replies, vec![prompts::STILL_PREPARING]);

        let stored = store.get(USER).await.unwrap().unwrap();
        assert!(stored.questions_ready, "worker result survived the replayed turn");
        assert_eq!(stored.questions.len(), 3);
        assert!(stored.last_seen_at.is_some());
    }
}

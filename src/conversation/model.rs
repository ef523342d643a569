//! The per-user conversation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::Step;

/// Number of interview questions in one session.
pub const QUESTION_COUNT: usize = 3;

/// Everything the service knows about one user's conversation.
///
/// Stored as one JSON document per `user_key`. Both the request handler and
/// the generation workers read-modify-write the whole record; `version` is
/// owned by the store and guards those writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_key: String,
    /// Minted on creation and on every reset. Jobs carry it so a worker can
    /// tell that the conversation it was started for is gone.
    pub session_id: Uuid,
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub questions_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testimonial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pro_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Write stamp. 0 means "never stored".
    #[serde(default)]
    pub version: u64,
}

impl ConversationRecord {
    /// A brand-new record at the initial step.
    pub fn new(user_key: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            session_id: Uuid::new_v4(),
            step: Step::Initial,
            context: None,
            questions: Vec::new(),
            answers: Vec::new(),
            questions_ready: false,
            generation_error: None,
            feedback_error: None,
            feedback_text: None,
            testimonial: None,
            pro_email: None,
            last_seen_at: None,
            version: 0,
        }
    }

    /// Replace this record with a fresh session for the same user.
    ///
    /// The stored version is kept so the replacing write still goes through
    /// the store's version check.
    pub fn reset(&mut self) {
        let version = self.version;
        let last_seen_at = self.last_seen_at;
        *self = Self::new(std::mem::take(&mut self.user_key));
        self.version = version;
        self.last_seen_at = last_seen_at;
    }

    /// Drop everything produced for the current interview. The session and
    /// the collected testimonial and e-mail are kept.
    pub fn clear_interview(&mut self) {
        self.context = None;
        self.questions.clear();
        self.answers.clear();
        self.questions_ready = false;
        self.feedback_text = None;
        self.feedback_error = None;
    }

    /// Whether the three questions are present.
    pub fn has_questions(&self) -> bool {
        self.questions.len() >= QUESTION_COUNT
    }

    /// The question at `index`, if it was generated.
    pub fn question(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    /// Record an answer, refusing to grow past the available questions.
    pub fn push_answer(&mut self, answer: impl Into<String>) -> bool {
        if self.answers.len() >= self.questions.len().min(QUESTION_COUNT) {
            return false;
        }
        self.answers.push(answer.into());
        true
    }

    /// Whether the record carries everything the feedback job needs.
    pub fn is_complete_interview(&self) -> bool {
        self.context.as_deref().is_some_and(|c| !c.trim().is_empty())
            && self.questions.len() == QUESTION_COUNT
            && self.answers.len() == QUESTION_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults() {
        let record = ConversationRecord::new("whatsapp:+5511999990000");
        assert_eq!(record.step, Step::Initial);
        assert_eq!(record.version, 0);
        assert!(record.questions.is_empty());
        assert!(!record.questions_ready);
        assert!(record.context.is_none());
    }

    #[test]
    fn reset_mints_new_session_and_keeps_version() {
        let mut record = ConversationRecord::new("u1");
        record.step = Step::AwaitingAnswer2;
        record.context = Some("dev".into());
        record.version = 7;
        let old_session = record.session_id;

        record.reset();

        assert_eq!(record.user_key, "u1");
        assert_eq!(record.step, Step::Initial);
        assert_eq!(record.version, 7);
        assert!(record.context.is_none());
        assert_ne!(record.session_id, old_session);
    }

    #[test]
    fn clear_interview_keeps_session() {
        let mut record = ConversationRecord::new("u1");
        record.context = Some("dev".into());
        record.questions = vec!["a".into(), "b".into(), "c".into()];
        record.answers = vec!["1".into(), "2".into(), "3".into()];
        record.questions_ready = true;
        record.feedback_error = Some("falhou".into());
        record.version = 4;
        let session = record.session_id;

        record.clear_interview();

        assert!(record.context.is_none());
        assert!(!record.has_questions());
        assert!(record.answers.is_empty());
        assert!(!record.questions_ready);
        assert!(record.feedback_error.is_none());
        assert_eq!(record.session_id, session);
        assert_eq!(record.version, 4);
    }

    #[test]
    fn answers_cannot_outgrow_questions() {
        let mut record = ConversationRecord::new("u1");
        assert!(!record.push_answer("orphan"));

        record.questions = vec!["a".into(), "b".into(), "c".into()];
        assert!(record.push_answer("1"));
        assert!(record.push_answer("2"));
        assert!(record.push_answer("3"));
        assert!(!record.push_answer("4"));
        assert_eq!(record.answers.len(), 3);
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let record = ConversationRecord::new("u1");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("context").is_none());
        assert!(json.get("feedback_text").is_none());
        assert_eq!(json["step"], "initial");
    }

    #[test]
    fn decodes_minimal_document() {
        let raw = r#"{"user_key":"u1","session_id":"6f1c1f0e-8a3c-4d8e-9f55-2b7c3a1d9e10","step":"awaiting_context"}"#;
        let record: ConversationRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.step, Step::AwaitingContext);
        assert!(record.answers.is_empty());
    }

    #[test]
    fn complete_interview_requires_all_parts() {
        let mut record = ConversationRecord::new("u1");
        record.context = Some("backend".into());
        record.questions = vec!["a".into(), "b".into(), "c".into()];
        record.answers = vec!["1".into(), "2".into()];
        assert!(!record.is_complete_interview());
        record.answers.push("3".into());
        assert!(record.is_complete_interview());
        record.context = Some("  ".into());
        assert!(!record.is_complete_interview());
    }
}

//! The conversation transition function.
//!
//! `transition` is pure: it mutates only the record it is given and reports
//! what the caller should send back and which background job, if any, the
//! new step needs. Storage, dispatch and delivery belong to the handler.

use super::keywords::{self, CONTEXT_UPDATE_MIN_CHARS};
use super::model::ConversationRecord;
use super::prompts;
use super::state::Step;

/// Background work a transition asks the handler to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    GenerateQuestions { context: String },
    GenerateFeedback,
}

/// Outcome of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Text to send back on the response channel.
    pub reply: String,
    pub dispatch: Option<JobRequest>,
}

impl Transition {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            dispatch: None,
        }
    }

    fn with_job(mut self, job: JobRequest) -> Self {
        self.dispatch = Some(job);
        self
    }
}

/// Apply the user's (already trimmed) input to the record's current step.
pub fn transition(record: &mut ConversationRecord, input: &str) -> Transition {
    let input = input.trim();
    match record.step {
        Step::Initial | Step::Finished => on_initial(record),
        Step::AwaitingContext => on_awaiting_context(record, input),
        Step::PreparingQuestions => on_preparing_questions(record, input),
        Step::AwaitingAnswer1 => on_first_answer(record, input),
        Step::AwaitingAnswer2 => on_answer(record, input, Step::AwaitingAnswer3),
        Step::AwaitingAnswer3 => on_last_answer(record, input),
        Step::GeneratingFeedback => on_generating_feedback(record),
        Step::AwaitingUserFeedback => on_user_feedback(record, input),
        Step::AwaitingProEmail => on_pro_email(record, input),
    }
}

fn on_initial(record: &mut ConversationRecord) -> Transition {
    record.step = Step::AwaitingContext;
    Transition::reply(prompts::ONBOARDING)
}

fn on_awaiting_context(record: &mut ConversationRecord, input: &str) -> Transition {
    // The questions worker already moved us back here; explain why before
    // asking for context again.
    if let Some(error) = record.generation_error.take() {
        return Transition::reply(error);
    }
    if input.is_empty() {
        return Transition::reply(prompts::ASK_CONTEXT);
    }

    // Leftovers from a previous interview must not be served again.
    record.clear_interview();
    record.context = Some(input.to_string());
    record.step = Step::PreparingQuestions;
    Transition::reply(prompts::CONTEXT_RECEIVED).with_job(JobRequest::GenerateQuestions {
        context: input.to_string(),
    })
}

fn on_preparing_questions(record: &mut ConversationRecord, input: &str) -> Transition {
    if let Some(error) = record.generation_error.take() {
        record.context = None;
        record.questions_ready = false;
        record.step = Step::AwaitingContext;
        return Transition::reply(error);
    }
    if input.is_empty() {
        return Transition::reply(prompts::STILL_PREPARING_EMPTY);
    }

    if keywords::is_ready(input) {
        // Only questions written by this session's worker count.
        let ready = record.questions_ready && record.has_questions();
        return match record.question(0).filter(|_| ready) {
            Some(first) => {
                let reply = prompts::question_message(1, first);
                record.step = Step::AwaitingAnswer1;
                record.questions_ready = false;
                Transition::reply(reply)
            }
            None => Transition::reply(prompts::ALMOST_READY),
        };
    }

    if input.chars().count() > CONTEXT_UPDATE_MIN_CHARS {
        record.context = Some(input.to_string());
        return Transition::reply(prompts::CONTEXT_UPDATED);
    }
    Transition::reply(prompts::STILL_PREPARING)
}

fn on_first_answer(record: &mut ConversationRecord, input: &str) -> Transition {
    // Question 1 has not reached the user yet; the handler pushes it.
    if record.questions_ready {
        return Transition::reply(prompts::FIRST_QUESTION_ON_ITS_WAY);
    }
    on_answer(record, input, Step::AwaitingAnswer2)
}

/// Record an answer and move to `next`, emitting the question it expects.
fn on_answer(record: &mut ConversationRecord, input: &str, next: Step) -> Transition {
    if input.is_empty() {
        return Transition::reply(prompts::ANSWER_REQUIRED);
    }
    let Some(next_index) = next.answer_index() else {
        return Transition::reply(prompts::ANSWER_REQUIRED);
    };
    if !record.push_answer(input) {
        return Transition::reply(prompts::missing_question(next_index + 1));
    }

    record.step = next;
    match record.question(next_index) {
        Some(question) => Transition::reply(prompts::question_message(next_index + 1, question)),
        None => Transition::reply(prompts::missing_question(next_index + 1)),
    }
}

fn on_last_answer(record: &mut ConversationRecord, input: &str) -> Transition {
    if input.is_empty() {
        return Transition::reply(prompts::ANSWER_REQUIRED);
    }
    if !record.push_answer(input) {
        return Transition::reply(prompts::missing_question(3));
    }
    record.step = Step::GeneratingFeedback;
    Transition::reply(prompts::ANSWERS_RECEIVED).with_job(JobRequest::GenerateFeedback)
}

fn on_generating_feedback(record: &mut ConversationRecord) -> Transition {
    if let Some(error) = record.feedback_error.take() {
        record.clear_interview();
        record.step = Step::AwaitingContext;
        return Transition::reply(prompts::feedback_failed(&error));
    }
    match record.feedback_text.take() {
        Some(feedback) => {
            record.step = Step::AwaitingUserFeedback;
            Transition::reply(feedback)
        }
        None => Transition::reply(prompts::STILL_GENERATING_FEEDBACK),
    }
}

fn on_user_feedback(record: &mut ConversationRecord, input: &str) -> Transition {
    record.testimonial = Some(input.to_string());
    record.step = Step::AwaitingProEmail;
    Transition::reply(prompts::PRO_OFFER)
}

fn on_pro_email(record: &mut ConversationRecord, input: &str) -> Transition {
    if keywords::is_decline(input) {
        record.step = Step::Finished;
        return Transition::reply(prompts::PRO_DECLINED);
    }
    if keywords::is_valid_email(input) {
        record.pro_email = Some(input.to_string());
        record.step = Step::Finished;
        return Transition::reply(prompts::email_saved(input));
    }
    Transition::reply(prompts::EMAIL_INVALID)
}

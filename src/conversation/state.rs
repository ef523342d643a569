//! Conversation steps: which part of the interview the user is in.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The steps of the interview conversation.
///
/// Progresses linearly: Initial → AwaitingContext → PreparingQuestions →
/// AwaitingAnswer1..3 → GeneratingFeedback → AwaitingUserFeedback →
/// AwaitingProEmail → Finished. Generation failures fall back to
/// AwaitingContext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Initial,
    AwaitingContext,
    PreparingQuestions,
    AwaitingAnswer1,
    AwaitingAnswer2,
    AwaitingAnswer3,
    GeneratingFeedback,
    AwaitingUserFeedback,
    AwaitingProEmail,
    Finished,
}

impl Step {
    /// Every step, in conversation order.
    pub const ALL: [Step; 10] = [
        Step::Initial,
        Step::AwaitingContext,
        Step::PreparingQuestions,
        Step::AwaitingAnswer1,
        Step::AwaitingAnswer2,
        Step::AwaitingAnswer3,
        Step::GeneratingFeedback,
        Step::AwaitingUserFeedback,
        Step::AwaitingProEmail,
        Step::Finished,
    ];

    /// Check if a transition from `self` to `target` is part of the topology.
    ///
    /// Staying in place is always allowed; reset to `Initial` is handled
    /// outside the machine and is not listed here.
    pub fn can_transition_to(&self, target: Step) -> bool {
        use Step::*;
        *self == target
            || matches!(
                (self, target),
                (Initial, AwaitingContext)
                    | (Finished, AwaitingContext)
                    | (AwaitingContext, PreparingQuestions)
                    | (PreparingQuestions, AwaitingAnswer1)
                    | (PreparingQuestions, AwaitingContext)
                    | (AwaitingAnswer1, AwaitingAnswer2)
                    | (AwaitingAnswer2, AwaitingAnswer3)
                    | (AwaitingAnswer3, GeneratingFeedback)
                    | (GeneratingFeedback, AwaitingUserFeedback)
                    | (GeneratingFeedback, AwaitingContext)
                    | (AwaitingUserFeedback, AwaitingProEmail)
                    | (AwaitingProEmail, Finished)
            )
    }

    /// Whether the conversation is over and the record should be deleted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Steps in which generated questions may be waiting for delivery.
    pub fn is_pre_answer(&self) -> bool {
        matches!(self, Self::PreparingQuestions | Self::AwaitingAnswer1)
    }

    /// Index of the question the user is answering in this step (0-based).
    pub fn answer_index(&self) -> Option<usize> {
        match self {
            Self::AwaitingAnswer1 => Some(0),
            Self::AwaitingAnswer2 => Some(1),
            Self::AwaitingAnswer3 => Some(2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::AwaitingContext => "awaiting_context",
            Self::PreparingQuestions => "preparing_questions",
            Self::AwaitingAnswer1 => "awaiting_answer_1",
            Self::AwaitingAnswer2 => "awaiting_answer_2",
            Self::AwaitingAnswer3 => "awaiting_answer_3",
            Self::GeneratingFeedback => "generating_feedback",
            Self::AwaitingUserFeedback => "awaiting_user_feedback",
            Self::AwaitingProEmail => "awaiting_pro_email",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown step: {s}"))
    }
}

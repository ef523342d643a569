//! Keyword sets and input checks used by the conversation flow.

use std::sync::LazyLock;

use regex::Regex;

/// Affirmative phrases that mean "send me the first question".
///
/// Matched as case-insensitive substrings, so short entries like "ok" or
/// "go" also fire inside longer words. That is accepted.
pub const READY_KEYWORDS: &[&str] = &[
    "estou pronto",
    "estou pronta",
    "pronto",
    "pronta",
    "ready",
    "vamos",
    "vamos lá",
    "vamos la",
    "vamos começar",
    "vamos comecar",
    "pode enviar",
    "pode mandar",
    "pode começar",
    "pode comecar",
    "manda",
    "envia",
    "envie",
    "bora",
    "ok",
    "sim",
    "yes",
    "go",
    "começar",
    "comecar",
    "começa",
    "start",
    "iniciar",
    "inicia",
    "início",
    "inicio",
    "let's go",
    "let us go",
    "let's",
    "let us",
];

/// Whole-message commands that discard the conversation and start over.
pub const RESET_KEYWORDS: &[&str] = &["reiniciar", "recomeçar", "restart"];

/// Answers to the PRO offer that mean "no thanks".
pub const DECLINE_KEYWORDS: &[&str] = &["finalizar", "finalizar.", "nao", "não", "no", "skip", "pular"];

/// Minimum length (in characters) for an unrecognized message in
/// `preparing_questions` to count as a context update.
pub const CONTEXT_UPDATE_MIN_CHARS: usize = 10;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

pub fn is_ready(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    !normalized.is_empty() && READY_KEYWORDS.iter().any(|k| normalized.contains(k))
}

pub fn is_reset(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    RESET_KEYWORDS.iter().any(|k| normalized == *k)
}

pub fn is_decline(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    DECLINE_KEYWORDS.iter().any(|k| normalized == *k)
}

pub fn is_valid_email(input: &str) -> bool {
    let candidate = input.trim();
    !candidate.is_empty() && EMAIL_RE.is_match(candidate)
}

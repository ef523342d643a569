//! The generation capability the workers depend on.

use async_trait::async_trait;

use crate::error::LlmError;

/// A text-in, text-out completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Run a single prompt and return the model's text reply.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

//! Bridges a rig-core completion model to [`LlmProvider`].

use async_trait::async_trait;
use rig::agent::{Agent, AgentBuilder};
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::LlmProvider;

const PREAMBLE: &str = "Você é um assistente de preparação para entrevistas de emprego. \
Responda sempre em português do Brasil e siga exatamente o formato pedido.";

const MAX_TOKENS: u64 = 1024;

pub struct RigAdapter<M: CompletionModel> {
    agent: Agent<M>,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        let agent = AgentBuilder::new(model)
            .preamble(PREAMBLE)
            .max_tokens(MAX_TOKENS)
            .build();
        Self {
            agent,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let reply: String = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;

        if reply.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.to_string(),
                reason: "empty completion".to_string(),
            });
        }
        Ok(reply)
    }
}

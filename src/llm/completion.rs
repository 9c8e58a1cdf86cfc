use std::sync::Arc;

use super::provider::{LlmProvider, TokenStream};
use super::types::{ChatMessage, ChatRequest};
use crate::core::errors::ApiError;

const ONE_SHOT_TEMPERATURE: f64 = 0.7;
const ONE_SHOT_MAX_TOKENS: i32 = 1024;

/// Chat-completion calls bound to the configured answer model.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let request = ChatRequest::new(messages)
            .with_temperature(ONE_SHOT_TEMPERATURE)
            .with_max_tokens(ONE_SHOT_MAX_TOKENS);
        self.provider.chat(request, &self.model).await
    }

    pub async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, ApiError> {
        self.provider
            .stream_chat(ChatRequest::new(messages), &self.model)
            .await
    }
}

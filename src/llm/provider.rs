use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

/// Receiving half of a token stream. The provider's reader task stops and
/// releases the upstream connection once this is dropped.
pub type TokenStream = mpsc::Receiver<Result<String, ApiError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError>;

    /// chat completion (streaming)
    async fn stream_chat(&self, request: ChatRequest, model_id: &str)
        -> Result<TokenStream, ApiError>;

    /// generate embeddings
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError>;
}

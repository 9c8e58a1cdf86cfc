use std::sync::Arc;

use super::provider::LlmProvider;
use crate::core::errors::ApiError;

/// Converts text into the fixed-size vectors the search index expects.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimensions,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let inputs = [text.to_string()];
        let mut vectors = self.provider.embed(&inputs, &self.model).await?;

        if vectors.is_empty() {
            return Err(ApiError::Internal("no embedding returned".to_string()));
        }
        let vector = vectors.swap_remove(0);

        if vector.len() != self.dimensions {
            return Err(ApiError::Internal(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }

        Ok(vector)
    }
}

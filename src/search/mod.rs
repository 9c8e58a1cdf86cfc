//! Search-engine seam: documents, index tasks and the hybrid query.

mod document;
mod meili;
mod retriever;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

pub use document::ChunkDocument;
pub use meili::MeiliClient;
pub use retriever::{channel_filter, HybridRetriever, MIN_RANKING_SCORE, SEMANTIC_RATIO};

/// Name of the single user-provided embedder configured on the index.
pub const DEFAULT_EMBEDDER: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
}

/// Snapshot of an asynchronous index task.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexTask {
    pub uid: u64,
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<TaskError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridOptions {
    pub semantic_ratio: f64,
    pub embedder: String,
}

/// Body of a combined keyword + vector search request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: String,
    pub vector: Vec<f32>,
    pub hybrid: HybridOptions,
    pub limit: usize,
    pub show_ranking_score: bool,
    pub ranking_score_threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index if needed and apply attribute and embedder settings.
    async fn ensure_index(&self) -> Result<(), ApiError>;

    /// Upsert documents; returns the uid of the enqueued task.
    async fn add_documents(&self, documents: &[ChunkDocument]) -> Result<u64, ApiError>;

    async fn get_task(&self, task_uid: u64) -> Result<IndexTask, ApiError>;

    /// Raw hits, undecoded, in ranked order.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, ApiError>;
}

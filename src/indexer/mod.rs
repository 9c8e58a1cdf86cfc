//! Turns source messages into persisted records and searchable documents.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::errors::{ApiError, IndexError};
use crate::ingest::event::{message_link, SourceMessage};
use crate::llm::EmbeddingClient;
use crate::search::{ChunkDocument, SearchIndex, TaskError, TaskStatus};
use crate::store::{NewChunk, RecordStore};

pub const TASK_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const TASK_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ChunkIndexer {
    embeddings: EmbeddingClient,
    store: Arc<dyn RecordStore>,
    index: Arc<dyn SearchIndex>,
    task_timeout: Duration,
}

impl ChunkIndexer {
    pub fn new(
        embeddings: EmbeddingClient,
        store: Arc<dyn RecordStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            embeddings,
            store,
            index,
            task_timeout: TASK_WAIT_TIMEOUT,
        }
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub async fn ensure_index(&self) -> Result<(), ApiError> {
        self.index.ensure_index().await
    }

    /// Embeds, persists and indexes one message. Returns `None` for empty text.
    ///
    /// A search-engine failure after the record was saved leaves the record
    /// in place.
    pub async fn index(
        &self,
        message: &SourceMessage,
        channel_id: i64,
    ) -> Result<Option<ChunkDocument>, IndexError> {
        if message.text.is_empty() {
            return Ok(None);
        }

        let embedding = self
            .embeddings
            .embed(&message.text)
            .await
            .map_err(IndexError::Embedding)?;

        let record = self
            .store
            .insert_chunk(NewChunk {
                content: message.text.clone(),
                channel_id: channel_id.to_string(),
                link: message_link(channel_id, message.id),
                raw: serde_json::to_value(message).ok(),
            })
            .await
            .map_err(IndexError::Persistence)?;

        let document = ChunkDocument::from_record(&record, embedding);
        let task_uid = self
            .index
            .add_documents(std::slice::from_ref(&document))
            .await
            .map_err(IndexError::Search)?;
        self.wait_for_task(task_uid).await?;

        info!(
            id = %record.id,
            channel_id,
            message_id = message.id,
            "Message indexed"
        );

        Ok(Some(document))
    }

    async fn wait_for_task(&self, task_uid: u64) -> Result<(), IndexError> {
        let poll = async {
            loop {
                let task = self
                    .index
                    .get_task(task_uid)
                    .await
                    .map_err(IndexError::Search)?;
                if task.status.is_terminal() {
                    return Ok::<_, IndexError>(task);
                }
                tokio::time::sleep(TASK_POLL_INTERVAL).await;
            }
        };

        let task = tokio::time::timeout(self.task_timeout, poll)
            .await
            .map_err(|_| IndexError::TaskTimeout {
                task_uid,
                timeout_secs: self.task_timeout.as_secs(),
            })??;

        match task.status {
            TaskStatus::Succeeded => Ok(()),
            TaskStatus::Canceled => Err(IndexError::TaskFailed {
                task_uid,
                code: "task_canceled".to_string(),
                error_type: "system".to_string(),
                message: "task was canceled".to_string(),
            }),
            _ => {
                let error = task.error.unwrap_or_else(|| TaskError {
                    message: "unknown failure".to_string(),
                    code: String::new(),
                    error_type: String::new(),
                });
                Err(IndexError::TaskFailed {
                    task_uid,
                    code: error.code,
                    error_type: error.error_type,
                    message: error.message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_store, FakeProvider, MemoryIndex, TEST_DIMENSIONS};

    fn message(text: &str) -> SourceMessage {
        SourceMessage {
            id: 11,
            text: text.to_string(),
            date: 1_735_787_045,
            author: None,
        }
    }

    async fn indexer(
        provider: Arc<FakeProvider>,
        index: Arc<MemoryIndex>,
    ) -> (ChunkIndexer, Arc<crate::store::SqliteRecordStore>) {
        let store = temp_store().await;
        let embeddings = EmbeddingClient::new(provider, "test-embed", TEST_DIMENSIONS);
        (ChunkIndexer::new(embeddings, store.clone(), index), store)
    }

    #[tokio::test]
    async fn indexes_message_into_store_and_search() {
        let provider = Arc::new(FakeProvider::new());
        let index = Arc::new(MemoryIndex::new());
        let (indexer, store) = indexer(provider.clone(), index.clone()).await;

        let doc = indexer.index(&message("hello"), 42).await.unwrap().unwrap();

        assert_eq!(doc.channel_id, "42");
        assert_eq!(doc.link, "https://t.me/c/42/11");
        assert_eq!(doc.vectors.len(), 1);
        assert_eq!(doc.vectors["default"].len(), TEST_DIMENSIONS);

        let record = store.get_chunk(&doc.id).await.unwrap().unwrap();
        assert_eq!(record.content, "hello");
        assert_eq!(record.raw.unwrap()["id"], 11);
        assert_eq!(index.documents(), vec![doc]);
    }

    #[tokio::test]
    async fn empty_text_touches_nothing() {
        let provider = Arc::new(FakeProvider::new());
        let index = Arc::new(MemoryIndex::new());
        let (indexer, store) = indexer(provider.clone(), index.clone()).await;

        assert!(indexer.index(&message(""), 42).await.unwrap().is_none());
        assert_eq!(provider.embed_calls(), 0);
        assert_eq!(store.count_chunks().await.unwrap(), 0);
        assert!(index.documents().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_persists_nothing() {
        let mut provider = FakeProvider::new();
        provider.fail_embed = true;
        let index = Arc::new(MemoryIndex::new());
        let (indexer, store) = indexer(Arc::new(provider), index.clone()).await;

        let err = indexer.index(&message("hello"), 42).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(store.count_chunks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_task_keeps_record_and_reports_details() {
        let provider = Arc::new(FakeProvider::new());
        let index = Arc::new(MemoryIndex::with_task_status(TaskStatus::Failed));
        let (indexer, store) = indexer(provider, index).await;

        let err = indexer.index(&message("hello"), 42).await.unwrap_err();
        match err {
            IndexError::TaskFailed { code, .. } => assert_eq!(code, "invalid_vector_dimensions"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count_chunks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stuck_task_times_out() {
        let provider = Arc::new(FakeProvider::new());
        let index = Arc::new(MemoryIndex::with_task_status(TaskStatus::Processing));
        let (indexer, _store) = indexer(provider, index).await;
        let indexer = indexer.with_task_timeout(Duration::from_millis(120));

        let err = indexer.index(&message("hello"), 42).await.unwrap_err();
        assert!(matches!(err, IndexError::TaskTimeout { .. }));
    }
}

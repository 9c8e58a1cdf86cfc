//! In-process fakes shared by unit and integration tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::{ChatRequest, LlmProvider, TokenStream};
use crate::search::{ChunkDocument, IndexTask, SearchIndex, SearchQuery, TaskError, TaskStatus};
use crate::store::SqliteRecordStore;

pub const TEST_DIMENSIONS: usize = 1024;

/// What the fake token stream does after its scripted tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Finish,
    /// Yields an upstream error.
    Fail,
    /// Holds the stream open until the consumer drops it.
    Stall,
}

pub struct FakeProvider {
    pub dimensions: usize,
    pub reply: String,
    pub tokens: Vec<String>,
    pub stream_end: StreamEnd,
    pub fail_stream_open: bool,
    pub fail_embed: bool,
    pub embed_calls: AtomicUsize,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    /// Set once a stalled stream notices its consumer is gone.
    pub stream_released: Arc<AtomicBool>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            dimensions: TEST_DIMENSIONS,
            reply: "answer".to_string(),
            tokens: vec!["Hel".to_string(), "lo".to_string()],
            stream_end: StreamEnd::Finish,
            fail_stream_open: false,
            fail_embed: false,
            embed_calls: AtomicUsize::new(0),
            chat_requests: Mutex::new(Vec::new()),
            stream_released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.chat_requests.lock().unwrap().last().cloned()
    }

    pub fn stream_released(&self) -> bool {
        self.stream_released.load(Ordering::SeqCst)
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        self.chat_requests.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        self.chat_requests.lock().unwrap().push(request);
        if self.fail_stream_open {
            return Err(ApiError::Internal("completion backend down".to_string()));
        }

        let (tx, rx) = mpsc::channel(4);
        let tokens = self.tokens.clone();
        let end = self.stream_end;
        let released = self.stream_released.clone();
        tokio::spawn(async move {
            for token in tokens {
                if tx.send(Ok(token)).await.is_err() {
                    return;
                }
            }
            match end {
                StreamEnd::Finish => {}
                StreamEnd::Fail => {
                    let _ = tx
                        .send(Err(ApiError::Internal("connection reset".to_string())))
                        .await;
                }
                StreamEnd::Stall => {
                    tx.closed().await;
                    released.store(true, Ordering::SeqCst);
                }
            }
        });
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(ApiError::Internal("embedding backend down".to_string()));
        }
        Ok(inputs.iter().map(|_| vec![0.25; self.dimensions]).collect())
    }
}

pub struct MemoryIndex {
    pub documents: Mutex<Vec<ChunkDocument>>,
    pub hits: Mutex<Vec<Value>>,
    pub task_status: TaskStatus,
    pub last_query: Mutex<Option<SearchQuery>>,
    next_uid: AtomicU64,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::with_task_status(TaskStatus::Succeeded)
    }

    pub fn with_task_status(task_status: TaskStatus) -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            hits: Mutex::new(Vec::new()),
            task_status,
            last_query: Mutex::new(None),
            next_uid: AtomicU64::new(1),
        }
    }

    pub fn with_hits(hits: Vec<Value>) -> Self {
        let index = Self::new();
        index.set_hits(hits);
        index
    }

    pub fn documents(&self) -> Vec<ChunkDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn set_hits(&self, hits: Vec<Value>) {
        *self.hits.lock().unwrap() = hits;
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn ensure_index(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn add_documents(&self, documents: &[ChunkDocument]) -> Result<u64, ApiError> {
        self.documents.lock().unwrap().extend_from_slice(documents);
        Ok(self.next_uid.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_task(&self, task_uid: u64) -> Result<IndexTask, ApiError> {
        let error = (self.task_status == TaskStatus::Failed).then(|| TaskError {
            message: "invalid vector".to_string(),
            code: "invalid_vector_dimensions".to_string(),
            error_type: "invalid_request".to_string(),
        });
        Ok(IndexTask {
            uid: task_uid,
            status: self.task_status,
            error,
        })
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, ApiError> {
        *self.last_query.lock().unwrap() = Some(query.clone());
        Ok(self.hits.lock().unwrap().clone())
    }
}

pub fn hit(id: &str, content: &str, score: f64) -> Value {
    json!({
        "id": id,
        "content": content,
        "channelId": "42",
        "link": format!("https://t.me/c/42/{}", id),
        "created": "2025-01-02T03:04:05Z",
        "updated": "2025-01-02T03:04:05Z",
        "_rankingScore": score
    })
}

pub async fn temp_store() -> Arc<SqliteRecordStore> {
    let path = std::env::temp_dir().join(format!("chanrag-test-{}.db", uuid::Uuid::new_v4()));
    Arc::new(SqliteRecordStore::new(path).await.unwrap())
}

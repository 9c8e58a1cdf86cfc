use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::config::{AppPaths, Settings};
use crate::indexer::ChunkIndexer;
use crate::ingest::{IngestionDispatcher, TelegramPoller, Whitelist};
use crate::llm::{CompletionClient, EmbeddingClient, LlmProvider, OpenAiProvider};
use crate::rag::RagOrchestrator;
use crate::search::{HybridRetriever, MeiliClient, SearchIndex};
use crate::store::{RecordStore, SqliteRecordStore};

pub mod error;

use error::InitializationError;

/// Application state shared across routes and background tasks.
///
/// Every client is built once here and handed to its users explicitly.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn RecordStore>,
    pub indexer: Arc<ChunkIndexer>,
    pub orchestrator: RagOrchestrator,
}

impl AppState {
    /// Connects the record store and builds the HTTP clients from settings.
    pub async fn initialize(
        paths: &AppPaths,
        settings: Settings,
    ) -> Result<Arc<Self>, InitializationError> {
        let store = SqliteRecordStore::new(paths.db_path.clone())
            .await
            .map_err(|e| InitializationError::Store(e.into()))?;

        let provider = OpenAiProvider::new(
            settings.llm.base_url.clone(),
            settings.llm.api_key.clone(),
            Duration::from_secs(settings.llm.request_timeout_secs),
        )
        .map_err(|e| InitializationError::Llm(e.into()))?;

        let index = MeiliClient::new(
            settings.search.host.clone(),
            settings.search.master_key.clone(),
            settings.search.index_uid.clone(),
            settings.llm.embedding_dimensions,
        )
        .map_err(|e| InitializationError::Search(e.into()))?;

        Ok(Self::from_parts(
            settings,
            Arc::new(store),
            Arc::new(provider),
            Arc::new(index),
        ))
    }

    /// Wires the pipeline over already constructed collaborators.
    pub fn from_parts(
        settings: Settings,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn LlmProvider>,
        index: Arc<dyn SearchIndex>,
    ) -> Arc<Self> {
        info!(
            provider = provider.name(),
            chat_model = %settings.llm.chat_model,
            embedding_model = %settings.llm.embedding_model,
            "LLM provider configured"
        );

        let embeddings = EmbeddingClient::new(
            provider.clone(),
            settings.llm.embedding_model.clone(),
            settings.llm.embedding_dimensions,
        );
        let completion = CompletionClient::new(provider, settings.llm.chat_model.clone());

        let indexer = Arc::new(ChunkIndexer::new(
            embeddings.clone(),
            store.clone(),
            index.clone(),
        ));
        let orchestrator = RagOrchestrator::new(
            embeddings,
            HybridRetriever::new(index),
            completion,
            store.clone(),
        );

        Arc::new(AppState {
            settings: Arc::new(settings),
            store,
            indexer,
            orchestrator,
        })
    }

    pub fn dispatcher(&self) -> IngestionDispatcher {
        IngestionDispatcher::new(
            Whitelist::new(self.settings.telegram.target_chat_ids.iter().copied()),
            self.indexer.clone(),
        )
    }

    /// `None` when no bot token is configured.
    pub fn telegram_poller(&self) -> Result<Option<TelegramPoller>, InitializationError> {
        let telegram = &self.settings.telegram;
        let Some(token) = telegram.bot_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        TelegramPoller::new(
            &telegram.api_url,
            token,
            telegram.poll_timeout_secs,
            telegram.retry_delay_secs,
        )
        .map(Some)
        .map_err(|e| InitializationError::Telegram(e.into()))
    }
}

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::context_builder::{build_context, derive_title, Source};
use super::prompt::answer_messages;
use crate::core::errors::ApiError;
use crate::llm::{CompletionClient, EmbeddingClient};
use crate::search::HybridRetriever;
use crate::store::{ChatStatus, Message, MessageStatus, NewMessage, RecordStore, Role};

pub const MAX_CONTEXT_DOCS: usize = 20;

const STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub chat_id: String,
    pub message_id: String,
    pub content: String,
    pub citations: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One provider token. `msg_id` is empty when the placeholder could not
    /// be persisted.
    Chunk { text: String, msg_id: String },
    /// Always the last event of a stream.
    Done,
}

/// Logs the full failure and hides it behind a generic message.
fn turn_failure(stage: &'static str) -> impl FnOnce(ApiError) -> ApiError {
    move |err| match err {
        ApiError::NotFound(_) | ApiError::BadRequest(_) => err,
        ApiError::Internal(detail) => {
            error!(error = %detail, "{}", stage);
            ApiError::Internal(stage.to_string())
        }
    }
}

fn citations_meta(sources: &[Source]) -> Value {
    json!({ "citations": sources })
}

/// Gives a fresh chat its title and moves it out of `empty`. Read then
/// write without a transaction: concurrent turns may both write.
async fn refresh_chat_state(
    store: &dyn RecordStore,
    chat_id: &str,
    question: &str,
) -> Result<(), ApiError> {
    let Some(mut chat) = store.get_chat(chat_id).await? else {
        return Ok(());
    };

    let is_new = chat.has_default_title();
    let is_empty = chat.status == ChatStatus::Empty;
    if !is_new && !is_empty {
        return Ok(());
    }

    if is_new {
        chat.title = derive_title(question);
    }
    chat.status = ChatStatus::Going;
    store.update_chat(&chat).await
}

/// Retrieval-augmented answering over the indexed corpus.
#[derive(Clone)]
pub struct RagOrchestrator {
    embeddings: EmbeddingClient,
    retriever: HybridRetriever,
    completion: CompletionClient,
    store: Arc<dyn RecordStore>,
}

impl RagOrchestrator {
    pub fn new(
        embeddings: EmbeddingClient,
        retriever: HybridRetriever,
        completion: CompletionClient,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            embeddings,
            retriever,
            completion,
            store,
        }
    }

    async fn retrieve_context(
        &self,
        question: &str,
        source_ids: &[String],
    ) -> Result<(String, Vec<Source>), ApiError> {
        let embedding = self
            .embeddings
            .embed(question)
            .await
            .map_err(turn_failure("Failed to process query"))?;

        let documents = self
            .retriever
            .search(question, &embedding, MAX_CONTEXT_DOCS, source_ids)
            .await
            .map_err(turn_failure("Search failed"))?;

        Ok(build_context(&documents))
    }

    async fn require_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        match self.store.get_chat(chat_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(ApiError::NotFound(format!("Chat {} not found", chat_id))),
            Err(e) => Err(turn_failure("Failed to load chat")(e)),
        }
    }

    async fn save_message(
        &self,
        chat_id: &str,
        role: Role,
        content: String,
        status: MessageStatus,
        meta: Option<Value>,
    ) -> Result<Message, ApiError> {
        self.store
            .create_message(NewMessage {
                chat: chat_id.to_string(),
                role,
                content,
                status,
                meta,
            })
            .await
    }

    /// One-shot turn: the full answer is generated and persisted before
    /// returning.
    pub async fn answer(
        &self,
        chat_id: Option<&str>,
        question: &str,
        source_ids: &[String],
    ) -> Result<ChatAnswer, ApiError> {
        let chat_id = match chat_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                self.require_chat(id).await?;
                id.to_string()
            }
            None => {
                self.store
                    .create_chat(&derive_title(question), ChatStatus::Empty)
                    .await
                    .map_err(turn_failure("Failed to create chat"))?
                    .id
            }
        };

        let user_message = self
            .save_message(
                &chat_id,
                Role::User,
                question.to_string(),
                MessageStatus::Final,
                None,
            )
            .await
            .map_err(turn_failure("Failed to save message"))?;
        debug!(id = %user_message.id, "User message saved");

        let (context, citations) = self.retrieve_context(question, source_ids).await?;

        if let Err(e) = refresh_chat_state(self.store.as_ref(), &chat_id, question).await {
            warn!(chat_id = %chat_id, error = %e, "Failed to update chat state");
        }

        let content = self
            .completion
            .complete(answer_messages(question, &context))
            .await
            .map_err(turn_failure("Failed to generate response"))?;

        let ai_message = self
            .save_message(
                &chat_id,
                Role::Ai,
                content.clone(),
                MessageStatus::Final,
                Some(citations_meta(&citations)),
            )
            .await
            .map_err(turn_failure("Failed to save response"))?;

        info!(
            chat_id = %chat_id,
            message_id = %ai_message.id,
            citations = citations.len(),
            "Answer generated"
        );

        Ok(ChatAnswer {
            chat_id,
            message_id: ai_message.id,
            content,
            citations,
        })
    }

    /// Streaming turn. Errors returned here happen before any output; once
    /// the receiver is handed out the turn always ends with `Done`.
    pub async fn answer_stream(
        &self,
        chat_id: &str,
        question: &str,
        source_ids: &[String],
    ) -> Result<mpsc::Receiver<StreamEvent>, ApiError> {
        self.require_chat(chat_id).await?;

        let (context, citations) = self.retrieve_context(question, source_ids).await?;

        self.save_message(
            chat_id,
            Role::User,
            question.to_string(),
            MessageStatus::Final,
            None,
        )
        .await
        .map_err(turn_failure("Failed to save message"))?;

        let placeholder = match self
            .save_message(
                chat_id,
                Role::Ai,
                String::new(),
                MessageStatus::Streaming,
                Some(citations_meta(&citations)),
            )
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to create streaming message");
                None
            }
        };

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let producer = StreamProducer {
            completion: self.completion.clone(),
            store: self.store.clone(),
            chat_id: chat_id.to_string(),
            question: question.to_string(),
            context,
            placeholder,
        };
        tokio::spawn(producer.run(tx));

        Ok(rx)
    }
}

struct StreamProducer {
    completion: CompletionClient,
    store: Arc<dyn RecordStore>,
    chat_id: String,
    question: String,
    context: String,
    placeholder: Option<Message>,
}

impl StreamProducer {
    async fn run(self, tx: mpsc::Sender<StreamEvent>) {
        let msg_id = self
            .placeholder
            .as_ref()
            .map(|m| m.id.clone())
            .unwrap_or_default();

        let content = self.relay_tokens(&tx, &msg_id).await;

        if let Some(mut message) = self.placeholder {
            message.content = content;
            message.status = MessageStatus::Final;
            if let Err(e) = self.store.update_message(&message).await {
                warn!(message_id = %message.id, error = %e, "Failed to finalize streamed message");
            }
        }

        if let Err(e) =
            refresh_chat_state(self.store.as_ref(), &self.chat_id, &self.question).await
        {
            warn!(chat_id = %self.chat_id, error = %e, "Failed to update chat state");
        }

        let _ = tx.send(StreamEvent::Done).await;
    }

    /// Forwards provider tokens until the provider finishes, fails, or the
    /// client goes away. Returns everything received. The token stream is
    /// dropped on return, which releases the upstream request.
    async fn relay_tokens(&self, tx: &mpsc::Sender<StreamEvent>, msg_id: &str) -> String {
        let mut content = String::new();

        let opened = tokio::select! {
            _ = tx.closed() => {
                debug!(chat_id = %self.chat_id, "Client disconnected before stream opened");
                return content;
            }
            opened = self
                .completion
                .stream(answer_messages(&self.question, &self.context)) => opened,
        };

        let mut tokens = match opened {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "Failed to start stream");
                return content;
            }
        };

        loop {
            let item = tokio::select! {
                _ = tx.closed() => {
                    debug!(chat_id = %self.chat_id, "Client disconnected");
                    break;
                }
                item = tokens.recv() => item,
            };

            let text = match item {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    warn!(chat_id = %self.chat_id, error = %e, "Stream ended with error");
                    break;
                }
                None => break,
            };

            content.push_str(&text);
            let event = StreamEvent::Chunk {
                text,
                msg_id: msg_id.to_string(),
            };
            if tx.send(event).await.is_err() {
                debug!(chat_id = %self.chat_id, "Client disconnected");
                break;
            }
        }

        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteRecordStore, DEFAULT_CHAT_TITLE};
    use crate::test_support::{
        hit, temp_store, FakeProvider, MemoryIndex, StreamEnd, TEST_DIMENSIONS,
    };
    use std::time::Duration;

    struct Harness {
        orchestrator: RagOrchestrator,
        provider: Arc<FakeProvider>,
        index: Arc<MemoryIndex>,
        store: Arc<SqliteRecordStore>,
    }

    async fn harness(provider: FakeProvider, index: MemoryIndex) -> Harness {
        let provider = Arc::new(provider);
        let index = Arc::new(index);
        let store = temp_store().await;
        let orchestrator = RagOrchestrator::new(
            EmbeddingClient::new(provider.clone(), "test-embed", TEST_DIMENSIONS),
            HybridRetriever::new(index.clone()),
            CompletionClient::new(provider.clone(), "test-chat"),
            store.clone(),
        );
        Harness {
            orchestrator,
            provider,
            index,
            store,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn one_shot_without_documents_uses_bare_question() {
        let h = harness(FakeProvider::new(), MemoryIndex::new()).await;

        let answer = h
            .orchestrator
            .answer(None, "What is the refund policy?", &[])
            .await
            .unwrap();

        assert_eq!(answer.content, "answer");
        assert!(answer.citations.is_empty());

        let request = h.provider.last_request().unwrap();
        assert_eq!(request.messages[1].content, "What is the refund policy?");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1024));

        let chat = h.store.get_chat(&answer.chat_id).await.unwrap().unwrap();
        assert_eq!(chat.title, "What is the refund policy?");
        assert_eq!(chat.status, ChatStatus::Going);

        let messages = h.store.list_messages(&answer.chat_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, answer.message_id);
        assert_eq!(messages[1].meta, Some(json!({ "citations": [] })));
    }

    #[tokio::test]
    async fn one_shot_cites_documents_in_rank_order() {
        let index = MemoryIndex::with_hits(vec![
            hit("a", "Refunds within 14 days", 0.9),
            hit("b", "Contact support", 0.7),
        ]);
        let h = harness(FakeProvider::new(), index).await;

        let answer = h
            .orchestrator
            .answer(None, "refund?", &["42".to_string()])
            .await
            .unwrap();

        let ids: Vec<&str> = answer.citations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let prompt = h.provider.last_request().unwrap().messages[1].content.clone();
        assert!(prompt.starts_with("Context:\n[1] Refunds within 14 days\n\n[2] Contact support"));
        assert!(prompt.ends_with("Question: refund?"));

        let query = h.index.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query.limit, MAX_CONTEXT_DOCS);
        assert_eq!(query.filter.as_deref(), Some("channelId IN [\"42\"]"));
    }

    #[tokio::test]
    async fn one_shot_keeps_custom_title_but_marks_going() {
        let h = harness(FakeProvider::new(), MemoryIndex::new()).await;
        let chat = h.store.create_chat("Pinned", ChatStatus::Empty).await.unwrap();

        h.orchestrator
            .answer(Some(&chat.id), "a long question that should not become a title", &[])
            .await
            .unwrap();

        let chat = h.store.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(chat.title, "Pinned");
        assert_eq!(chat.status, ChatStatus::Going);
    }

    #[tokio::test]
    async fn unknown_chat_is_not_found() {
        let h = harness(FakeProvider::new(), MemoryIndex::new()).await;

        let err = h
            .orchestrator
            .answer(Some("nosuchchat0000"), "hi", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = h
            .orchestrator
            .answer_stream("nosuchchat0000", "hi", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn embedding_failure_hides_details() {
        let mut provider = FakeProvider::new();
        provider.fail_embed = true;
        let h = harness(provider, MemoryIndex::new()).await;

        let err = h.orchestrator.answer(None, "hi", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "internal error: Failed to process query");
    }

    #[tokio::test]
    async fn stream_persists_concatenated_tokens_and_titles_chat() {
        let h = harness(FakeProvider::new(), MemoryIndex::new()).await;
        let chat = h
            .store
            .create_chat(DEFAULT_CHAT_TITLE, ChatStatus::Empty)
            .await
            .unwrap();

        let rx = h
            .orchestrator
            .answer_stream(&chat.id, "Where is the office?", &[])
            .await
            .unwrap();
        let events = collect(rx).await;

        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(
            events.iter().filter(|e| **e == StreamEvent::Done).count(),
            1
        );

        let mut streamed = String::new();
        let mut msg_ids = Vec::new();
        for event in &events {
            if let StreamEvent::Chunk { text, msg_id } = event {
                streamed.push_str(text);
                msg_ids.push(msg_id.clone());
            }
        }
        assert_eq!(streamed, "Hello");

        let messages = h.store.list_messages(&chat.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        let ai = &messages[1];
        assert_eq!(ai.role, Role::Ai);
        assert_eq!(ai.content, streamed);
        assert_eq!(ai.status, MessageStatus::Final);
        assert!(msg_ids.iter().all(|id| *id == ai.id));

        let chat = h.store.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(chat.title, "Where is the office?");
        assert_eq!(chat.status, ChatStatus::Going);
    }

    #[tokio::test]
    async fn stream_with_no_tokens_still_finishes() {
        let mut provider = FakeProvider::new();
        provider.tokens.clear();
        let h = harness(provider, MemoryIndex::new()).await;
        let chat = h.store.create_chat("t", ChatStatus::Going).await.unwrap();

        let rx = h.orchestrator.answer_stream(&chat.id, "q", &[]).await.unwrap();
        assert_eq!(collect(rx).await, vec![StreamEvent::Done]);

        let messages = h.store.list_messages(&chat.id).await.unwrap();
        assert_eq!(messages[1].content, "");
        assert_eq!(messages[1].status, MessageStatus::Final);
    }

    #[tokio::test]
    async fn client_disconnect_finalizes_partial_answer() {
        let mut provider = FakeProvider::new();
        provider.tokens = (0..200).map(|i| format!("t{} ", i)).collect();
        let full: String = provider.tokens.concat();
        let h = harness(provider, MemoryIndex::new()).await;
        let chat = h.store.create_chat("t", ChatStatus::Going).await.unwrap();

        let mut rx = h.orchestrator.answer_stream(&chat.id, "q", &[]).await.unwrap();
        assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk { .. })));
        drop(rx);

        let message = wait_for_final(&h.store, &chat.id)
            .await
            .expect("streamed message was never finalized");
        assert!(!message.content.is_empty());
        assert!(message.content.len() < full.len());
        assert!(full.starts_with(&message.content));
    }

    async fn wait_for_final(store: &SqliteRecordStore, chat_id: &str) -> Option<Message> {
        for _ in 0..100 {
            let messages = store.list_messages(chat_id).await.unwrap();
            if messages[1].status == MessageStatus::Final {
                return Some(messages[1].clone());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }

    #[tokio::test]
    async fn client_disconnect_releases_stalled_provider_stream() {
        let mut provider = FakeProvider::new();
        provider.tokens = vec!["first".to_string()];
        provider.stream_end = StreamEnd::Stall;
        let h = harness(provider, MemoryIndex::new()).await;
        let chat = h.store.create_chat("t", ChatStatus::Going).await.unwrap();

        let mut rx = h.orchestrator.answer_stream(&chat.id, "q", &[]).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::Chunk { ref text, .. }) if text == "first"
        ));
        drop(rx);

        let message = wait_for_final(&h.store, &chat.id)
            .await
            .expect("streamed message was never finalized");
        assert_eq!(message.content, "first");

        let mut released = false;
        for _ in 0..100 {
            if h.provider.stream_released() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(released, "provider stream still held after disconnect");
    }

    #[tokio::test]
    async fn provider_error_mid_stream_ends_like_completion() {
        let mut provider = FakeProvider::new();
        provider.tokens = vec!["first".to_string()];
        provider.stream_end = StreamEnd::Fail;
        let h = harness(provider, MemoryIndex::new()).await;
        let chat = h.store.create_chat("t", ChatStatus::Going).await.unwrap();

        let rx = h.orchestrator.answer_stream(&chat.id, "q", &[]).await.unwrap();
        let events = collect(rx).await;

        let messages = h.store.list_messages(&chat.id).await.unwrap();
        let ai = &messages[1];
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk {
                    text: "first".to_string(),
                    msg_id: ai.id.clone(),
                },
                StreamEvent::Done,
            ]
        );
        assert_eq!(ai.content, "first");
        assert_eq!(ai.status, MessageStatus::Final);
    }

    #[tokio::test]
    async fn stream_that_fails_to_open_still_sends_done() {
        let mut provider = FakeProvider::new();
        provider.fail_stream_open = true;
        let h = harness(provider, MemoryIndex::new()).await;
        let chat = h.store.create_chat("t", ChatStatus::Going).await.unwrap();

        let rx = h.orchestrator.answer_stream(&chat.id, "q", &[]).await.unwrap();
        assert_eq!(collect(rx).await, vec![StreamEvent::Done]);

        let messages = h.store.list_messages(&chat.id).await.unwrap();
        assert_eq!(messages[1].content, "");
        assert_eq!(messages[1].status, MessageStatus::Final);
    }
}

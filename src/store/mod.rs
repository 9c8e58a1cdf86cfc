//! Document-database access for chunks, chats and messages.
//!
//! `RecordStore` is the only way the pipeline touches durable state; the
//! SQLite implementation maps rows to the typed entities in `models`.

mod models;
mod sqlite;

use async_trait::async_trait;
use rand::Rng;

use crate::core::errors::ApiError;

pub use models::{
    Chat, ChatStatus, ChunkRecord, Message, MessageStatus, NewChunk, NewMessage, Page,
    PageRequest, Role, DEFAULT_CHAT_TITLE, MAX_PER_PAGE,
};
pub use sqlite::SqliteRecordStore;

const RECORD_ID_LEN: usize = 15;
const RECORD_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a 15 character lowercase alphanumeric record id.
pub fn new_record_id() -> String {
    let mut rng = rand::rng();
    (0..RECORD_ID_LEN)
        .map(|_| RECORD_ID_ALPHABET[rng.random_range(0..RECORD_ID_ALPHABET.len())] as char)
        .collect()
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new chunk record; the store assigns id and timestamps.
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkRecord, ApiError>;

    async fn get_chunk(&self, id: &str) -> Result<Option<ChunkRecord>, ApiError>;

    async fn count_chunks(&self) -> Result<i64, ApiError>;

    async fn create_chat(&self, title: &str, status: ChatStatus) -> Result<Chat, ApiError>;

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, ApiError>;

    /// Chats, newest first.
    async fn list_chats(&self, page: PageRequest) -> Result<Page<Chat>, ApiError>;

    /// Overwrite title and status of an existing chat.
    async fn update_chat(&self, chat: &Chat) -> Result<(), ApiError>;

    async fn create_message(&self, message: NewMessage) -> Result<Message, ApiError>;

    /// Overwrite content, status and meta of an existing message.
    async fn update_message(&self, message: &Message) -> Result<(), ApiError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ApiError>;

    /// Messages of a chat in creation order.
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Pages count back from the newest message; items inside a page are in
    /// creation order.
    async fn list_messages_page(
        &self,
        chat_id: &str,
        page: PageRequest,
    ) -> Result<Page<Message>, ApiError>;
}

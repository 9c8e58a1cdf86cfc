//! Typed entities persisted in the document database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// Title given to chats created before their first message.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Empty,
    Going,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Final,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::Empty => "empty",
            ChatStatus::Going => "going",
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "ai",
        }
    }
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Streaming => "streaming",
            MessageStatus::Final => "final",
        }
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(ChatStatus::Empty),
            "going" => Ok(ChatStatus::Going),
            other => Err(unexpected("chat status", other)),
        }
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "ai" => Ok(Role::Ai),
            other => Err(unexpected("message role", other)),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streaming" => Ok(MessageStatus::Streaming),
            "final" => Ok(MessageStatus::Final),
            other => Err(unexpected("message status", other)),
        }
    }
}

fn unexpected(kind: &str, value: &str) -> ApiError {
    ApiError::Internal(format!("unexpected {}: {}", kind, value))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub status: ChatStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Chat {
    /// A chat still waiting for its first exchange: default or blank title.
    pub fn has_default_title(&self) -> bool {
        self.title.is_empty() || self.title == DEFAULT_CHAT_TITLE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub meta: Option<Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub meta: Option<Value>,
}

/// Authoritative record behind an indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    pub channel_id: String,
    pub link: String,
    pub raw: Option<Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Upper bound on `per_page` for any listing.
pub const MAX_PER_PAGE: u32 = 500;

/// 1-based page selector for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Clamps `page` to at least 1 and `per_page` to `1..=MAX_PER_PAGE`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_items: i64) -> Self {
        let per_page = i64::from(request.per_page);
        Self {
            page: request.page,
            per_page: request.per_page,
            total_items,
            total_pages: (total_items + per_page - 1) / per_page,
            items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub channel_id: String,
    pub link: String,
    pub raw: Option<Value>,
}

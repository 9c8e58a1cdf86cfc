use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::models::{
    Chat, ChatStatus, ChunkRecord, Message, MessageStatus, NewChunk, NewMessage, Page,
    PageRequest, Role,
};
use super::{new_record_id, RecordStore};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to record db: {}", e)))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), ApiError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                link TEXT NOT NULL,
                raw TEXT,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'empty',
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                meta TEXT,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                FOREIGN KEY(chat_id) REFERENCES chats(id) ON DELETE CASCADE
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to init record db: {}", e)))?;
        }

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApiError::internal(format!("invalid timestamp '{}': {}", raw, e)))
}

fn encode_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_json(raw: Option<String>) -> Option<Value> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
}

fn chunk_from_row(row: &SqliteRow) -> Result<ChunkRecord, ApiError> {
    Ok(ChunkRecord {
        id: row.try_get("id").map_err(ApiError::internal)?,
        content: row.try_get("content").map_err(ApiError::internal)?,
        channel_id: row.try_get("channel_id").map_err(ApiError::internal)?,
        link: row.try_get("link").map_err(ApiError::internal)?,
        raw: parse_json(row.try_get("raw").map_err(ApiError::internal)?),
        created: parse_timestamp(&row.try_get::<String, _>("created").map_err(ApiError::internal)?)?,
        updated: parse_timestamp(&row.try_get::<String, _>("updated").map_err(ApiError::internal)?)?,
    })
}

fn chat_from_row(row: &SqliteRow) -> Result<Chat, ApiError> {
    Ok(Chat {
        id: row.try_get("id").map_err(ApiError::internal)?,
        title: row.try_get("title").map_err(ApiError::internal)?,
        status: row
            .try_get::<String, _>("status")
            .map_err(ApiError::internal)?
            .parse()?,
        created: parse_timestamp(&row.try_get::<String, _>("created").map_err(ApiError::internal)?)?,
        updated: parse_timestamp(&row.try_get::<String, _>("updated").map_err(ApiError::internal)?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message, ApiError> {
    Ok(Message {
        id: row.try_get("id").map_err(ApiError::internal)?,
        chat: row.try_get("chat_id").map_err(ApiError::internal)?,
        role: row
            .try_get::<String, _>("role")
            .map_err(ApiError::internal)?
            .parse()?,
        content: row.try_get("content").map_err(ApiError::internal)?,
        status: row
            .try_get::<String, _>("status")
            .map_err(ApiError::internal)?
            .parse()?,
        meta: parse_json(row.try_get("meta").map_err(ApiError::internal)?),
        created: parse_timestamp(&row.try_get::<String, _>("created").map_err(ApiError::internal)?)?,
        updated: parse_timestamp(&row.try_get::<String, _>("updated").map_err(ApiError::internal)?)?,
    })
}

fn encode_json(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn count_from_row(row: &SqliteRow) -> Result<i64, ApiError> {
    row.try_get::<i64, _>(0).map_err(ApiError::internal)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkRecord, ApiError> {
        let now = Utc::now();
        let record = ChunkRecord {
            id: new_record_id(),
            content: chunk.content,
            channel_id: chunk.channel_id,
            link: chunk.link,
            raw: chunk.raw,
            created: now,
            updated: now,
        };

        sqlx::query(
            "INSERT INTO chunks (id, content, channel_id, link, raw, created, updated)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.content)
        .bind(&record.channel_id)
        .bind(&record.link)
        .bind(encode_json(&record.raw))
        .bind(encode_timestamp(&record.created))
        .bind(encode_timestamp(&record.updated))
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save chunk: {}", e)))?;

        Ok(record)
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<ChunkRecord>, ApiError> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(chunk_from_row).transpose()
    }

    async fn count_chunks(&self) -> Result<i64, ApiError> {
        let row = sqlx::query("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        count_from_row(&row)
    }

    async fn create_chat(&self, title: &str, status: ChatStatus) -> Result<Chat, ApiError> {
        let now = Utc::now();
        let chat = Chat {
            id: new_record_id(),
            title: title.to_string(),
            status,
            created: now,
            updated: now,
        };

        sqlx::query("INSERT INTO chats (id, title, status, created, updated) VALUES (?, ?, ?, ?, ?)")
            .bind(&chat.id)
            .bind(&chat.title)
            .bind(chat.status.as_str())
            .bind(encode_timestamp(&chat.created))
            .bind(encode_timestamp(&chat.updated))
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create chat: {}", e)))?;

        Ok(chat)
    }

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, ApiError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(chat_from_row).transpose()
    }

    async fn list_chats(&self, page: PageRequest) -> Result<Page<Chat>, ApiError> {
        let total = sqlx::query("SELECT COUNT(*) FROM chats")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let rows = sqlx::query("SELECT * FROM chats ORDER BY created DESC, rowid DESC LIMIT ? OFFSET ?")
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let chats = rows.iter().map(chat_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(chats, page, count_from_row(&total)?))
    }

    async fn update_chat(&self, chat: &Chat) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE chats SET title = ?, status = ?, updated = ? WHERE id = ?")
            .bind(&chat.title)
            .bind(chat.status.as_str())
            .bind(encode_timestamp(&Utc::now()))
            .bind(&chat.id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("chat {}", chat.id)));
        }
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, ApiError> {
        let now = Utc::now();
        let record = Message {
            id: new_record_id(),
            chat: message.chat,
            role: message.role,
            content: message.content,
            status: message.status,
            meta: message.meta,
            created: now,
            updated: now,
        };

        sqlx::query(
            "INSERT INTO messages (id, chat_id, role, content, status, meta, created, updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.chat)
        .bind(record.role.as_str())
        .bind(&record.content)
        .bind(record.status.as_str())
        .bind(encode_json(&record.meta))
        .bind(encode_timestamp(&record.created))
        .bind(encode_timestamp(&record.updated))
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save message: {}", e)))?;

        Ok(record)
    }

    async fn update_message(&self, message: &Message) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE messages SET content = ?, status = ?, meta = ?, updated = ? WHERE id = ?",
        )
        .bind(&message.content)
        .bind(message.status.as_str())
        .bind(encode_json(&message.meta))
        .bind(encode_timestamp(&Utc::now()))
        .bind(&message.id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("message {}", message.id)));
        }
        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ApiError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE chat_id = ? ORDER BY created ASC, rowid ASC")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        rows.iter().map(message_from_row).collect()
    }

    async fn list_messages_page(
        &self,
        chat_id: &str,
        page: PageRequest,
    ) -> Result<Page<Message>, ApiError> {
        let total = sqlx::query("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let rows = sqlx::query(
            "SELECT * FROM (
                SELECT *, rowid AS seq FROM messages WHERE chat_id = ?
                ORDER BY created DESC, rowid DESC LIMIT ? OFFSET ?
             ) ORDER BY created ASC, seq ASC",
        )
        .bind(chat_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let messages = rows.iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(messages, page, count_from_row(&total)?))
    }
}

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::rag::StreamEvent;
use crate::state::AppState;
use crate::store::{ChatStatus, PageRequest, DEFAULT_CHAT_TITLE};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub q: Option<String>,
    /// Comma-separated channel ids.
    #[serde(rename = "sourceIds")]
    pub source_ids: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    #[serde(default)]
    pub title: String,
}

const CHATS_PER_PAGE: u32 = 20;
const MESSAGES_PER_PAGE: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    fn resolve(&self, default_per_page: u32) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(default_per_page),
        )
    }
}

fn chat_not_found() -> ApiError {
    ApiError::NotFound("Chat not found".to_string())
}

fn split_source_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;

    if request.message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let answer = state
        .orchestrator
        .answer(
            request.chat_id.as_deref(),
            &request.message,
            &request.source_ids,
        )
        .await?;

    Ok(Json(answer))
}

fn sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Chunk { text, msg_id } => Event::default()
            .event("chunk")
            .data(json!({ "text": text, "msgId": msg_id }).to_string()),
        StreamEvent::Done => Event::default().event("done").data("{}"),
    }
}

fn event_stream(
    events: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(events, |mut events| async move {
        events
            .recv()
            .await
            .map(|event| (Ok(sse_event(event)), events))
    })
}

pub async fn chat_sse(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let question = query
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query is required".to_string()))?;
    let source_ids = split_source_ids(query.source_ids.as_deref());

    let events = state
        .orchestrator
        .answer_stream(&chat_id, &question, &source_ids)
        .await?;

    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    Ok((headers, Sse::new(event_stream(events))))
}

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateChatRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string());

    let chat = state.store.create_chat(&title, ChatStatus::Empty).await?;
    Ok(Json(json!({ "chat": chat })))
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let chats = state
        .store
        .list_chats(query.resolve(CHATS_PER_PAGE))
        .await?;
    Ok(Json(chats))
}

pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state
        .store
        .get_chat(&chat_id)
        .await?
        .ok_or_else(chat_not_found)?;

    let messages = state.store.list_messages(&chat_id).await?;
    Ok(Json(json!({ "chat": chat, "messages": messages })))
}

/// Renames a chat. Status is left to the chat turns.
pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    payload: Result<Json<UpdateChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;

    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }

    let mut chat = state
        .store
        .get_chat(&chat_id)
        .await?
        .ok_or_else(chat_not_found)?;
    chat.title = title.to_string();
    state.store.update_chat(&chat).await?;

    let chat = state
        .store
        .get_chat(&chat_id)
        .await?
        .ok_or_else(chat_not_found)?;
    Ok(Json(json!({ "chat": chat })))
}

pub async fn list_chat_messages(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_chat(&chat_id).await?.is_none() {
        return Err(chat_not_found());
    }

    let messages = state
        .store
        .list_messages_page(&chat_id, query.resolve(MESSAGES_PER_PAGE))
        .await?;
    Ok(Json(messages))
}

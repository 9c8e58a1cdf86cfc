use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let chunks = state.store.count_chunks().await?;
    let telegram = &state.settings.telegram;

    Ok(Json(json!({
        "status": "ok",
        "indexed_chunks": chunks,
        "whitelist_size": telegram.target_chat_ids.len(),
        "telegram_enabled": telegram.bot_token.as_deref().is_some_and(|t| !t.is_empty()),
        "chat_model": state.settings.llm.chat_model,
        "embedding_model": state.settings.llm.embedding_model,
    })))
}

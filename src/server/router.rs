use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::defaults::default_local_origins;
use crate::server::handlers::{chat, health};
use crate::state::AppState;

/// Creates the application router: chat endpoints, chat management and
/// health probes, behind CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(health::get_status))
        .route("/api/chat", post(chat::post_chat))
        .route(
            "/api/chats",
            get(chat::list_chats).post(chat::create_chat),
        )
        .route(
            "/api/chats/:chat_id",
            get(chat::get_chat).patch(chat::update_chat),
        )
        .route(
            "/api/chats/:chat_id/messages",
            get(chat::list_chat_messages),
        )
        .route("/api/chats/:chat_id/sse", get(chat::chat_sse))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let allowed_origins = resolve_allowed_origins(configured)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::CACHE_CONTROL])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_origin_list_falls_back_to_local_defaults() {
        let origins = resolve_allowed_origins(&[" ".to_string()]);
        assert!(origins.contains(&"http://localhost:5173".to_string()));
    }

    #[test]
    fn configured_origins_are_trimmed() {
        let origins = resolve_allowed_origins(&[" https://chat.example.com ".to_string()]);
        assert_eq!(origins, vec!["https://chat.example.com".to_string()]);
    }
}

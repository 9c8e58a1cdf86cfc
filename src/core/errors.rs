use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Errors raised while turning a source message into a searchable chunk.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to generate embedding: {0}")]
    Embedding(#[source] ApiError),

    #[error("failed to save chunk record: {0}")]
    Persistence(#[source] ApiError),

    #[error("failed to submit document to search index: {0}")]
    Search(#[source] ApiError),

    #[error("search index task {task_uid} failed: {message} (code: {code}, type: {error_type})")]
    TaskFailed {
        task_uid: u64,
        code: String,
        error_type: String,
        message: String,
    },

    #[error("search index task {task_uid} did not finish within {timeout_secs}s")]
    TaskTimeout { task_uid: u64, timeout_secs: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn api_error_renders_json_body() {
        let response = ApiError::BadRequest("Message is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Message is required");
    }

    #[test]
    fn task_failure_message_carries_engine_details() {
        let err = IndexError::TaskFailed {
            task_uid: 7,
            code: "invalid_document_id".to_string(),
            error_type: "invalid_request".to_string(),
            message: "bad id".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("bad id"));
        assert!(text.contains("invalid_document_id"));
        assert!(text.contains("invalid_request"));
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{ChunkDocument, IndexTask, SearchIndex, SearchQuery, DEFAULT_EMBEDDER};
use crate::core::errors::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueuedTask {
    task_uid: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Value>,
}

/// Meilisearch REST client bound to a single index.
#[derive(Clone)]
pub struct MeiliClient {
    host: String,
    master_key: Option<String>,
    index_uid: String,
    embedding_dimensions: usize,
    client: Client,
}

impl MeiliClient {
    pub fn new(
        host: String,
        master_key: Option<String>,
        index_uid: String,
        embedding_dimensions: usize,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            master_key: master_key.filter(|k| !k.is_empty()),
            index_uid,
            embedding_dimensions,
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.host, path);
        let builder = self.client.request(method, url);
        match &self.master_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn index_path(&self, suffix: &str) -> String {
        format!("/indexes/{}{}", urlencoding::encode(&self.index_uid), suffix)
    }

    async fn enqueue(&self, builder: RequestBuilder, what: &str) -> Result<u64, ApiError> {
        let res = builder.send().await.map_err(ApiError::internal)?;
        let res = check_status(res, what).await?;
        let task: EnqueuedTask = res.json().await.map_err(ApiError::internal)?;
        Ok(task.task_uid)
    }
}

async fn check_status(res: Response, what: &str) -> Result<Response, ApiError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    Err(ApiError::Internal(format!("{} failed ({}): {}", what, status, text)))
}

fn index_settings(embedding_dimensions: usize) -> Value {
    json!({
        "searchableAttributes": ["content"],
        "filterableAttributes": ["channelId", "created", "updated"],
        "sortableAttributes": ["created", "updated"],
        "embedders": {
            DEFAULT_EMBEDDER: {
                "source": "userProvided",
                "dimensions": embedding_dimensions,
            }
        }
    })
}

#[async_trait]
impl SearchIndex for MeiliClient {
    async fn ensure_index(&self) -> Result<(), ApiError> {
        // An existing index makes this task fail asynchronously, which is fine.
        self.enqueue(
            self.request(Method::POST, "/indexes")
                .json(&json!({ "uid": self.index_uid, "primaryKey": "id" })),
            "create index",
        )
        .await?;

        self.enqueue(
            self.request(Method::PATCH, &self.index_path("/settings"))
                .json(&index_settings(self.embedding_dimensions)),
            "update index settings",
        )
        .await?;

        info!(index = %self.index_uid, "Search index configured");
        Ok(())
    }

    async fn add_documents(&self, documents: &[ChunkDocument]) -> Result<u64, ApiError> {
        self.enqueue(
            self.request(Method::POST, &self.index_path("/documents"))
                .query(&[("primaryKey", "id")])
                .json(documents),
            "add documents",
        )
        .await
    }

    async fn get_task(&self, task_uid: u64) -> Result<IndexTask, ApiError> {
        let res = self
            .request(Method::GET, &format!("/tasks/{}", task_uid))
            .send()
            .await
            .map_err(ApiError::internal)?;
        let res = check_status(res, "get task").await?;
        res.json().await.map_err(ApiError::internal)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, ApiError> {
        let res = self
            .request(Method::POST, &self.index_path("/search"))
            .json(query)
            .send()
            .await
            .map_err(ApiError::internal)?;
        let res = check_status(res, "search").await?;
        let payload: SearchResponse = res.json().await.map_err(ApiError::internal)?;
        Ok(payload.hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_declare_user_provided_embedder() {
        let settings = index_settings(1024);
        assert_eq!(settings["searchableAttributes"], json!(["content"]));
        assert_eq!(
            settings["filterableAttributes"],
            json!(["channelId", "created", "updated"])
        );
        assert_eq!(settings["embedders"]["default"]["source"], "userProvided");
        assert_eq!(settings["embedders"]["default"]["dimensions"], 1024);
    }

    #[test]
    fn index_path_is_encoded() {
        let client = MeiliClient::new(
            "http://localhost:7700/".to_string(),
            Some(String::new()),
            "chunks".to_string(),
            1024,
        )
        .unwrap();

        assert_eq!(client.host, "http://localhost:7700");
        assert!(client.master_key.is_none());
        assert_eq!(client.index_path("/search"), "/indexes/chunks/search");
    }

    #[test]
    fn enqueued_task_response_decodes() {
        let task: EnqueuedTask = serde_json::from_value(json!({
            "taskUid": 31,
            "indexUid": "chunks",
            "status": "enqueued",
            "type": "documentAdditionOrUpdate",
            "enqueuedAt": "2025-01-02T03:04:05Z"
        }))
        .unwrap();
        assert_eq!(task.task_uid, 31);
    }
}

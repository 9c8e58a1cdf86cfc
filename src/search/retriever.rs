use std::sync::Arc;

use tracing::{debug, warn};

use super::{ChunkDocument, HybridOptions, SearchIndex, SearchQuery, DEFAULT_EMBEDDER};
use crate::core::errors::ApiError;

/// Share of the hybrid score taken from vector similarity.
pub const SEMANTIC_RATIO: f64 = 0.6;
/// Hits scoring below this are never returned.
pub const MIN_RANKING_SCORE: f64 = 0.5;

/// Restricts hits to the given channels; `None` when the list is empty.
pub fn channel_filter(source_ids: &[String]) -> Option<String> {
    let quoted: Vec<String> = source_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();

    if quoted.is_empty() {
        None
    } else {
        Some(format!("channelId IN [{}]", quoted.join(", ")))
    }
}

#[derive(Clone)]
pub struct HybridRetriever {
    index: Arc<dyn SearchIndex>,
}

impl HybridRetriever {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    pub async fn search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        limit: usize,
        source_ids: &[String],
    ) -> Result<Vec<ChunkDocument>, ApiError> {
        let query = SearchQuery {
            q: query_text.to_string(),
            vector: query_vector.to_vec(),
            hybrid: HybridOptions {
                semantic_ratio: SEMANTIC_RATIO,
                embedder: DEFAULT_EMBEDDER.to_string(),
            },
            limit,
            show_ranking_score: true,
            ranking_score_threshold: MIN_RANKING_SCORE,
            filter: channel_filter(source_ids),
        };

        let hits = self.index.search(&query).await?;
        let total = hits.len();

        let mut documents = Vec::with_capacity(total);
        for hit in hits {
            let doc = match serde_json::from_value::<ChunkDocument>(hit) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, "Failed to decode search hit");
                    continue;
                }
            };
            if doc.ranking_score.is_some_and(|s| s < MIN_RANKING_SCORE) {
                continue;
            }
            documents.push(doc);
        }

        debug!(hits = total, kept = documents.len(), "Hybrid search finished");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::IndexTask;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct CannedIndex {
        hits: Vec<Value>,
        last_query: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl SearchIndex for CannedIndex {
        async fn ensure_index(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn add_documents(&self, _documents: &[ChunkDocument]) -> Result<u64, ApiError> {
            Ok(0)
        }

        async fn get_task(&self, _task_uid: u64) -> Result<IndexTask, ApiError> {
            Err(ApiError::Internal("not used".to_string()))
        }

        async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, ApiError> {
            *self.last_query.lock().unwrap() = Some(serde_json::to_value(query).unwrap());
            Ok(self.hits.clone())
        }
    }

    fn hit(id: &str, score: f64) -> Value {
        json!({
            "id": id,
            "content": format!("content {}", id),
            "channelId": "42",
            "link": format!("https://t.me/c/42/{}", id),
            "created": "2025-01-02T03:04:05Z",
            "updated": "2025-01-02T03:04:05Z",
            "_rankingScore": score
        })
    }

    #[tokio::test]
    async fn drops_low_scores_and_undecodable_hits() {
        let index = Arc::new(CannedIndex {
            hits: vec![hit("a", 0.9), json!({ "id": 5 }), hit("b", 0.3), hit("c", 0.5)],
            last_query: Mutex::new(None),
        });
        let retriever = HybridRetriever::new(index.clone());

        let docs = retriever.search("refund", &[0.1, 0.2], 20, &[]).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let query = index.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query["limit"], 20);
        assert_eq!(query["q"], "refund");
        assert!(query.get("filter").is_none());
    }

    #[tokio::test]
    async fn source_ids_become_channel_filter() {
        let index = Arc::new(CannedIndex {
            hits: vec![],
            last_query: Mutex::new(None),
        });
        let retriever = HybridRetriever::new(index.clone());

        retriever
            .search("q", &[0.0], 5, &["42".to_string(), " 7 ".to_string()])
            .await
            .unwrap();

        let query = index.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query["filter"], "channelId IN [\"42\", \"7\"]");
    }

    #[test]
    fn channel_filter_escapes_and_skips_blanks() {
        assert_eq!(channel_filter(&[]), None);
        assert_eq!(channel_filter(&[" ".to_string()]), None);
        assert_eq!(
            channel_filter(&["a\"b".to_string()]),
            Some("channelId IN [\"a\\\"b\"]".to_string())
        );
    }
}

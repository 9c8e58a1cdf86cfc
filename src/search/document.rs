use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DEFAULT_EMBEDDER;
use crate::store::ChunkRecord;

/// A single indexed content unit as stored in the search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDocument {
    pub id: String,
    pub content: String,
    pub channel_id: String,
    pub link: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(rename = "_vectors", default, skip_serializing_if = "HashMap::is_empty")]
    pub vectors: HashMap<String, Vec<f32>>,
    #[serde(
        rename = "_rankingScore",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ranking_score: Option<f64>,
}

impl ChunkDocument {
    /// Builds the index document for a persisted record, carrying the
    /// embedding under the default embedder.
    pub fn from_record(record: &ChunkRecord, embedding: Vec<f32>) -> Self {
        let mut vectors = HashMap::with_capacity(1);
        vectors.insert(DEFAULT_EMBEDDER.to_string(), embedding);

        Self {
            id: record.id.clone(),
            content: record.content.clone(),
            channel_id: record.channel_id.clone(),
            link: record.link.clone(),
            created: record.created,
            updated: record.updated,
            vectors,
            ranking_score: None,
        }
    }
}

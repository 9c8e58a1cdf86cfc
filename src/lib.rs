//! Telegram channel ingestion and retrieval-augmented chat backend.

pub mod core;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod search;
pub mod server;
pub mod state;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

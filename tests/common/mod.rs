#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use chanrag_backend::core::config::Settings;
use chanrag_backend::server::router::router;
use chanrag_backend::state::AppState;
use chanrag_backend::test_support::{temp_store, FakeProvider, MemoryIndex};

pub const CANNED_ANSWER: &str = "Refunds are accepted within 14 days [1].";

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub provider: Arc<FakeProvider>,
    pub index: Arc<MemoryIndex>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn build_state(
    settings: Settings,
) -> (Arc<AppState>, Arc<FakeProvider>, Arc<MemoryIndex>) {
    let mut provider = FakeProvider::new();
    provider.reply = CANNED_ANSWER.to_string();
    let provider = Arc::new(provider);
    let index = Arc::new(MemoryIndex::new());
    let state = AppState::from_parts(settings, temp_store().await, provider.clone(), index.clone());
    (state, provider, index)
}

pub async fn spawn_app() -> TestApp {
    let (state, provider, index) = build_state(Settings::default()).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        state,
        provider,
        index,
        client: reqwest::Client::new(),
    }
}

/// Splits an SSE body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event = rest.trim().to_string();
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data.push_str(rest.trim());
                }
            }
            (event, serde_json::from_str(&data).unwrap())
        })
        .collect()
}

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{LlmProvider, TokenStream};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for OpenAI-compatible HTTP APIs (OpenAI, LiteLLM proxies, ...).
///
/// `timeout` bounds whole one-shot requests. Streams have no total limit;
/// it bounds the wait for response headers and each gap between body chunks.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
            client,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn chat_body(request: &ChatRequest, model_id: &str, stream: bool) -> Value {
    let mut body = json!({
        "model": model_id,
        "messages": request.messages,
        "stream": stream,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(t) = request.temperature {
            obj.insert("temperature".to_string(), json!(t));
        }
        if let Some(t) = request.max_tokens {
            obj.insert("max_tokens".to_string(), json!(t));
        }
    }

    body
}

#[derive(Debug, PartialEq)]
enum StreamLine {
    Content(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => StreamLine::Content(content.to_string()),
            _ => StreamLine::Skip,
        },
        Err(_) => StreamLine::Skip,
    }
}

/// Removes every complete line from `buffer`, leaving a trailing partial line
/// in place for the next network chunk. Works on bytes so a multi-byte
/// character split across chunks is decoded only once it is whole.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let body = chat_body(&request, model_id, false);

        let res = self
            .post("/chat/completions")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "chat completion error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::Internal("no response generated".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        let body = chat_body(&request, model_id, true);

        let pending = self.post("/chat/completions").json(&body).send();
        let res = tokio::time::timeout(self.timeout, pending)
            .await
            .map_err(|_| ApiError::Internal("chat stream timed out waiting for response".to_string()))?
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "chat stream error ({}): {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();
        let idle_timeout = self.timeout;

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => return,
                    next = tokio::time::timeout(idle_timeout, stream.next()) => next,
                };
                let item = match next {
                    Ok(Some(item)) => item,
                    Ok(None) => return,
                    Err(_) => {
                        let _ = tx
                            .send(Err(ApiError::Internal(format!(
                                "chat stream idle for {}s",
                                idle_timeout.as_secs()
                            ))))
                            .await;
                        return;
                    }
                };
                match item {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        for line in drain_lines(&mut buffer) {
                            match parse_stream_line(&line) {
                                StreamLine::Content(content) => {
                                    if tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                                StreamLine::Done => return,
                                StreamLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .post("/embeddings")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "embedding error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        Ok(embeddings)
    }
}

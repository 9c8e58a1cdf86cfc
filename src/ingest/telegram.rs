//! Telegram Bot API long-poll source.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::event::{IncomingEvent, SourceMessage};
use crate::core::errors::ApiError;

/// Bot API channel and supergroup ids are `-100` followed by the bare id.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<BotMessage>,
    #[serde(default)]
    channel_post: Option<BotMessage>,
}

#[derive(Debug, Deserialize)]
struct BotMessage {
    message_id: i64,
    date: i64,
    chat: BotChat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    author_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

fn bare_channel_id(chat_id: i64) -> i64 {
    if chat_id <= -CHANNEL_ID_OFFSET {
        -chat_id - CHANNEL_ID_OFFSET
    } else {
        chat_id.abs()
    }
}

pub(crate) fn decode_update(update: Update) -> IncomingEvent {
    let Some(raw) = update.channel_post.or(update.message) else {
        return IncomingEvent::Unrecognized;
    };

    let message = SourceMessage {
        id: raw.message_id,
        text: raw.text.or(raw.caption).unwrap_or_default(),
        date: raw.date,
        author: raw.author_signature,
    };

    match raw.chat.kind.as_str() {
        "channel" | "supergroup" => IncomingEvent::ChannelMessage {
            message,
            channel_id: bare_channel_id(raw.chat.id),
        },
        "group" => IncomingEvent::DirectMessage {
            message,
            peer_id: raw.chat.id.abs(),
        },
        "private" => IncomingEvent::DirectMessage {
            message,
            peer_id: raw.chat.id,
        },
        _ => IncomingEvent::Unrecognized,
    }
}

pub struct TelegramPoller {
    client: Client,
    endpoint: String,
    poll_timeout_secs: u64,
    retry_delay: Duration,
}

impl TelegramPoller {
    pub fn new(
        api_url: &str,
        bot_token: &str,
        poll_timeout_secs: u64,
        retry_delay_secs: u64,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/getUpdates",
                api_url.trim_end_matches('/'),
                bot_token
            ),
            poll_timeout_secs,
            retry_delay: Duration::from_secs(retry_delay_secs),
        })
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ApiError> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "channel_post"],
            }))
            .send()
            .await
            .map_err(|e| ApiError::internal(e.without_url()))?;

        let payload: UpdatesResponse = res
            .json()
            .await
            .map_err(|e| ApiError::internal(e.without_url()))?;

        if !payload.ok {
            return Err(ApiError::Internal(format!(
                "getUpdates rejected: {}",
                payload.description.unwrap_or_default()
            )));
        }
        Ok(payload.result)
    }

    /// Polls until shutdown or until the receiving side goes away. Poll
    /// failures are retried after the configured delay.
    pub async fn run(self, events: mpsc::Sender<IncomingEvent>, mut shutdown: watch::Receiver<bool>) {
        info!("Telegram poller started");
        let mut offset = 0;

        'poll: loop {
            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.get_updates(offset) => result,
            };

            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        let event = decode_update(update);
                        if events.send(event).await.is_err() {
                            debug!("Event receiver closed");
                            break 'poll;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Telegram poll failed; retrying");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        info!("Telegram poller stopped");
    }
}

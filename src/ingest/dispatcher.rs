use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::event::IncomingEvent;
use super::whitelist::Whitelist;
use crate::core::errors::IndexError;
use crate::indexer::ChunkIndexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Indexed,
    /// Source channel is not on the allow-list.
    Filtered,
    /// Nothing to index: empty text or an unrecognized update.
    Skipped,
}

pub struct IngestionDispatcher {
    whitelist: Whitelist,
    indexer: Arc<ChunkIndexer>,
}

impl IngestionDispatcher {
    pub fn new(whitelist: Whitelist, indexer: Arc<ChunkIndexer>) -> Self {
        Self { whitelist, indexer }
    }

    pub async fn handle(&self, event: IncomingEvent) -> Result<Outcome, IndexError> {
        let (message, source_id) = match event {
            IncomingEvent::ChannelMessage {
                message,
                channel_id,
            } => (message, channel_id),
            IncomingEvent::DirectMessage { message, peer_id } => (message, peer_id),
            IncomingEvent::Unrecognized => return Ok(Outcome::Skipped),
        };

        if message.text.is_empty() {
            return Ok(Outcome::Skipped);
        }

        if !self.whitelist.allowed(source_id) {
            debug!(
                chat_id = source_id,
                message_id = message.id,
                "Message from non-whitelisted chat, skipping"
            );
            return Ok(Outcome::Filtered);
        }

        info!(
            chat_id = source_id,
            message_id = message.id,
            text_len = message.text.len(),
            "Processing message"
        );

        match self.indexer.index(&message, source_id).await? {
            Some(_) => Ok(Outcome::Indexed),
            None => Ok(Outcome::Skipped),
        }
    }

    /// Drains the event channel one message at a time until it closes or
    /// shutdown is signalled. Handler errors are logged and dropped.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<IncomingEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            whitelist_size = self.whitelist.len(),
            "Ingestion listener started"
        );

        loop {
            let event = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                break;
            };

            let source = event.source();
            if let Err(e) = self.handle(event).await {
                let (chat_id, message_id) = source.unwrap_or_default();
                error!(error = %e, chat_id, message_id, "Failed to index message");
            }
        }

        info!("Ingestion listener stopped");
    }
}

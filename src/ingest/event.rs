use serde::{Deserialize, Serialize};

/// A text message as received from the messaging platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: i64,
    pub text: String,
    /// Unix seconds.
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Platform update decoded once at the event source boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    /// Posted in a channel or supergroup.
    ChannelMessage {
        message: SourceMessage,
        channel_id: i64,
    },
    /// Posted in a basic group or a private chat.
    DirectMessage { message: SourceMessage, peer_id: i64 },
    Unrecognized,
}

impl IncomingEvent {
    /// `(source id, message id)` for log context.
    pub fn source(&self) -> Option<(i64, i64)> {
        match self {
            IncomingEvent::ChannelMessage {
                message,
                channel_id,
            } => Some((*channel_id, message.id)),
            IncomingEvent::DirectMessage { message, peer_id } => Some((*peer_id, message.id)),
            IncomingEvent::Unrecognized => None,
        }
    }
}

/// Deep link back to the originating message.
pub fn message_link(channel_id: i64, message_id: i64) -> String {
    format!("https://t.me/c/{}/{}", channel_id, message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_uses_bare_channel_id() {
        assert_eq!(message_link(42, 7), "https://t.me/c/42/7");
    }
}

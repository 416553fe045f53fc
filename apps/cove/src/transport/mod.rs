use serde::Deserialize;
use thiserror::Error;

pub mod websocket;

pub use websocket::{ChannelSender, ChatChannel};

/// One inbound chat frame, as the hub broadcasts it. Outbound frames carry
/// no envelope; the server attributes authorship itself.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub author: String,
    pub text: String,
}

impl ChatMessage {
    pub fn decode(payload: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(payload)
            .map_err(|err| ChannelError::MalformedFrame(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Why an open channel stopped. `Closed` is terminal, with no
/// reconnection path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server closed the connection or the stream ended cleanly.
    Remote,
    /// The transport surfaced an error; authorization rejections land here.
    Error(String),
}

#[derive(Debug)]
pub enum ChannelEvent {
    Message(ChatMessage),
    Closed(CloseReason),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel handshake failed: {0}")]
    Handshake(String),
    #[error("channel is closed")]
    Closed,
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_frame() {
        let message = ChatMessage::decode(r#"{"author":"bob","text":"hi"}"#).unwrap();
        assert_eq!(
            message,
            ChatMessage {
                author: "bob".into(),
                text: "hi".into(),
            }
        );
    }

    #[test]
    fn malformed_frame_is_error() {
        assert!(matches!(
            ChatMessage::decode("not json"),
            Err(ChannelError::MalformedFrame(_))
        ));
        assert!(matches!(
            ChatMessage::decode(r#"{"author":1,"text":"hi"}"#),
            Err(ChannelError::MalformedFrame(_))
        ));
        assert!(matches!(
            ChatMessage::decode(r#"{"text":"missing author"}"#),
            Err(ChannelError::MalformedFrame(_))
        ));
    }

    #[test]
    fn tolerates_unknown_fields() {
        let message =
            ChatMessage::decode(r#"{"author":"bob","text":"hi","sent_at":"irrelevant"}"#).unwrap();
        assert_eq!(message.author, "bob");
    }
}

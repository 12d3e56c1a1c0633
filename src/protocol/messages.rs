//! Chat Wire Messages
//!
//! JSON text frames tagged by `type`. Liveness probes never travel as text;
//! they are WebSocket ping frames.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::storage::{ChatRecord, NewChat};

/// Messages accepted from clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A chat line for a room
    Chat(IncomingChat),
    /// Free-form client acknowledgement, logged only
    Reply {
        #[serde(default)]
        data: serde_json::Value,
    },
}

/// Body of an inbound chat message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IncomingChat {
    pub room: String,
    pub user: String,
    #[serde(default)]
    pub chat: Option<String>,
    #[serde(default)]
    pub gif: Option<String>,
}

impl From<IncomingChat> for NewChat {
    fn from(incoming: IncomingChat) -> Self {
        NewChat {
            room: incoming.room,
            user: incoming.user,
            chat: incoming.chat,
            gif: incoming.gif,
        }
    }
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { connection_id: String },
    Chat(ChatRecord),
    News { message: String },
    Error { message: String },
}

impl ServerMessage {
    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode and check an inbound text frame
pub fn decode_client_message(text: &str) -> Result<ClientMessage, RelayError> {
    let message: ClientMessage = serde_json::from_str(text)?;

    if let ClientMessage::Chat(chat) = &message {
        if chat.room.trim().is_empty() {
            return Err(RelayError::ProtocolViolation("chat.room is required".into()));
        }
        if chat.user.trim().is_empty() {
            return Err(RelayError::ProtocolViolation("chat.user is required".into()));
        }
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chat() {
        let msg = decode_client_message(
            r#"{"type":"chat","room":"lobby","user":"kim","chat":"hi"}"#,
        )
        .unwrap();

        match msg {
            ClientMessage::Chat(chat) => {
                assert_eq!(chat.room, "lobby");
                assert_eq!(chat.chat.as_deref(), Some("hi"));
                assert!(chat.gif.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_gif_only_chat() {
        let msg = decode_client_message(
            r#"{"type":"chat","room":"lobby","user":"kim","gif":"cat.gif"}"#,
        );
        assert!(msg.is_ok());
    }

    #[test]
    fn test_decode_reply() {
        let msg = decode_client_message(r#"{"type":"reply","data":{"ok":true}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Reply { .. }));
    }

    #[test]
    fn test_malformed_payloads_are_violations() {
        for bad in [
            "not json",
            r#"{"type":"dance"}"#,
            r#"{"type":"chat","room":"","user":"kim","chat":"hi"}"#,
            r#"{"type":"chat","room":"lobby","user":" ","chat":"hi"}"#,
        ] {
            let err = decode_client_message(bad).unwrap_err();
            assert!(
                matches!(err, RelayError::ProtocolViolation(_)),
                "expected violation for {}",
                bad
            );
        }
    }

    #[test]
    fn test_chat_without_text_or_gif_is_accepted() {
        let msg = decode_client_message(r#"{"type":"chat","room":"lobby","user":"kim"}"#).unwrap();
        match msg {
            ClientMessage::Chat(chat) => {
                assert_eq!(chat.room, "lobby");
                assert!(chat.chat.is_none());
                assert!(chat.gif.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_tags() {
        let json = ServerMessage::News {
            message: "hello".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"news","message":"hello"}"#);
    }
}

//! Chat Protocol Module
//!
//! Wire messages exchanged over the WebSocket.

pub mod messages;

pub use messages::{decode_client_message, ClientMessage, IncomingChat, ServerMessage};

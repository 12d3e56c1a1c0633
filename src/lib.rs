//! ChatRelay Library
//!
//! Real-time WebSocket chat relay. Clients connect over a persistent socket,
//! chat messages are persisted to a document store and fanned out to every
//! open connection, and a liveness monitor probes and evicts dead peers.

pub mod config;
pub mod connection;
pub mod error;
pub mod management;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod storage;

pub use config::Config;
pub use connection::{ConnectionRegistry, LivenessMonitor};
pub use error::RelayError;
pub use relay::RelayEngine;
pub use server::{ChatServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay server
pub type Result<T> = anyhow::Result<T>;

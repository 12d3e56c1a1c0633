//! Management Module
//!
//! HTTP surface of the relay: WebSocket upgrade, health, status,
//! connection listing, chat history and metrics.

pub mod api;
pub mod handlers;
pub mod types;

pub use api::ManagementApi;
pub use handlers::AppState;
pub use types::{ApiResponse, HealthStatus, ServerStatus};

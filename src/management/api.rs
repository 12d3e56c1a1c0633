//! HTTP Routes
//!
//! The WebSocket endpoint plus the read-only management API.

use super::handlers::*;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Relay HTTP router
pub struct ManagementApi;

impl ManagementApi {
    /// Create the router serving the WebSocket path and `/api/v1`
    pub fn create_router(state: AppState) -> Router {
        let ws_path = state.config.server.ws_path.clone();

        let api_routes = Router::new()
            .route("/health", get(health_check))
            .route("/status", get(get_server_status))
            .route("/connections", get(get_connections))
            .route("/rooms/:room/chats", get(get_room_chats));

        Router::new()
            .route(&ws_path, get(ws_handler))
            .route("/metrics", get(export_metrics))
            .nest("/api/v1", api_routes)
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

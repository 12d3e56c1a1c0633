//! Management API Handlers

use super::types::*;
use crate::config::Config;
use crate::connection::ConnectionInfo;
use crate::relay::{run_session, RelayEngine};
use crate::storage::ChatRecord;
use axum::{
    extract::{
        ws::WebSocketUpgrade,
        ConnectInfo, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::error;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: RelayEngine,
    pub config: Arc<Config>,
    pub start_time: SystemTime,
}

/// Query parameters for chat history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let remote_addr = client_addr(&headers, peer);
    let send_queue_size = state.config.server.send_queue_size;
    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| run_session(socket, remote_addr, engine, send_queue_size))
}

/// Client address, preferring the first `X-Forwarded-For` hop
pub fn client_addr(headers: &HeaderMap, peer: SocketAddr) -> SocketAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, peer.port()))
        .unwrap_or(peer)
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let health = HealthStatus {
        status: "healthy".to_string(),
        storage: state.engine.store().backend_name().to_string(),
        active_connections: state.engine.registry().len().await,
    };
    Json(ApiResponse::success(health))
}

/// Get server status
pub async fn get_server_status(State(state): State<AppState>) -> Json<ApiResponse<ServerStatus>> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();
    let registry = state.engine.registry();
    let metrics = registry.metrics();

    let status = ServerStatus {
        uptime_seconds: uptime,
        active_connections: registry.len().await,
        total_connections: metrics.total_connections(),
        messages_relayed: metrics.messages_relayed(),
        evictions: metrics.evictions(),
        persistence_failures: metrics.persistence_failures(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(status))
}

/// List live connections
pub async fn get_connections(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ConnectionInfo>>> {
    let connections = state.engine.registry().connection_infos().await;
    Json(ApiResponse::success(connections))
}

/// Recent chat history for a room
pub async fn get_room_chats(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<ChatRecord>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match state.engine.store().recent(&room, limit).await {
        Ok(chats) => Ok(Json(ApiResponse::success(chats))),
        Err(e) => {
            error!(room = %room, "Failed to load chat history: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            ))
        }
    }
}

/// Prometheus metrics export
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.registry().metrics().render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                String::new(),
            )
        }
    }
}

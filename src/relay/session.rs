//! WebSocket Session
//!
//! Drives one upgraded socket: registers it, runs a writer task that drains
//! the connection's outbound queue and a reader task that feeds the relay
//! engine, then unregisters when either side stops.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::RelayEngine;
use crate::connection::{ChannelSink, Connection, ConnectionId, Outbound};

/// Serve a WebSocket until it closes, errors, or is evicted
#[instrument(skip(socket, engine, send_queue_size))]
pub async fn run_session(
    mut socket: WebSocket,
    remote_addr: SocketAddr,
    engine: RelayEngine,
    send_queue_size: usize,
) {
    let (sink, outbound_rx) = ChannelSink::channel(send_queue_size);
    let connection = Connection::new(remote_addr, sink);

    let id = match engine.registry().register(connection).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Refusing WebSocket from {}: {}", remote_addr, e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(connection_id = %id, "Connected: {}", remote_addr);

    if let Err(e) = engine.send_welcome(&id).await {
        warn!(connection_id = %id, "Failed to send welcome: {}", e);
        return;
    }

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, outbound_rx, id.clone()));
    let mut reader = tokio::spawn(read_loop(ws_rx, engine.clone(), id.clone()));

    let hard_error = tokio::select! {
        _ = &mut writer => {
            reader.abort();
            false
        }
        result = &mut reader => {
            writer.abort();
            result.unwrap_or(true)
        }
    };

    let registry = engine.registry();
    if hard_error {
        // read error: Open -> Closed without passing through Closing
        registry.unregister(&id).await;
    } else {
        registry.close(&id).await;
    }
    info!(connection_id = %id, "Disconnected: {}", remote_addr);
}

async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    id: ConnectionId,
) {
    while let Some(frame) = outbound_rx.recv().await {
        let (message, last) = match frame {
            Outbound::Text(text) => (Message::Text(text), false),
            Outbound::Probe => (Message::Ping(Vec::new()), false),
            Outbound::Close => (Message::Close(None), true),
        };

        if let Err(e) = ws_tx.send(message).await {
            debug!(connection_id = %id, "Socket write failed: {}", e);
            break;
        }
        if last {
            break;
        }
    }
    let _ = ws_tx.close().await;
}

/// Returns true when the socket ended with a transport error
async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    engine: RelayEngine,
    id: ConnectionId,
) -> bool {
    let registry = engine.registry();

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                warn!(connection_id = %id, "WebSocket error: {}", e);
                return true;
            }
        };

        match message {
            Message::Text(text) => {
                if let Err(e) = engine.handle_inbound(&id, &text).await {
                    if e.is_connection_fatal() {
                        break;
                    }
                }
            }
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => {
                    if let Err(e) = engine.handle_inbound(&id, &text).await {
                        if e.is_connection_fatal() {
                            break;
                        }
                    }
                }
                Err(_) => {
                    warn!(connection_id = %id, "Closing connection after non-UTF-8 binary frame");
                    registry.metrics().protocol_violation();
                    break;
                }
            },
            // axum answers pings itself; both directions still count as activity
            Message::Ping(_) | Message::Pong(_) => {
                registry.touch(&id).await;
            }
            Message::Close(_) => {
                debug!(connection_id = %id, "Client initiated close");
                break;
            }
        }
    }
    false
}

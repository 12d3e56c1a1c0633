//! Connection Types
//!
//! A `Connection` is owned by the registry for its whole lifetime. The
//! transport side only keeps the `ConnectionId` and the receiving half of the
//! outbound queue.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RelayError;

/// Unique connection identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Connection lifecycle: `Open -> Closing -> Closed`, or `Open -> Closed`
/// on a hard transport error. Nothing re-enters `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Frames queued for the transport writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Application payload (JSON text frame)
    Text(String),
    /// Liveness probe, sent as a WebSocket ping
    Probe,
    /// Ask the writer to close the socket and stop
    Close,
}

/// Why a sink refused a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("send queue full")]
    Full,
    #[error("transport closed")]
    Closed,
}

/// Outbound half of a transport-level duplex channel
pub trait ConnectionSink: Send + Sync {
    /// Queue a frame without blocking
    fn send(&self, frame: Outbound) -> Result<(), SinkError>;
}

/// Sink backed by a bounded queue drained by the connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver the writer drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ConnectionSink for ChannelSink {
    fn send(&self, frame: Outbound) -> Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// A live client connection
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    created_at: Instant,
    created_wall: SystemTime,
    /// Milliseconds after `created_at` at which traffic was last seen
    last_activity_ms: AtomicU64,
    missed_probes: AtomicU32,
    state: AtomicU8,
    sink: Box<dyn ConnectionSink>,
}

impl Connection {
    /// Create a new open connection with a fresh identifier
    pub fn new(remote_addr: SocketAddr, sink: impl ConnectionSink + 'static) -> Self {
        Self::with_id(ConnectionId::new(), remote_addr, sink)
    }

    /// Create a new open connection with a caller-chosen identifier
    pub fn with_id(
        id: ConnectionId,
        remote_addr: SocketAddr,
        sink: impl ConnectionSink + 'static,
    ) -> Self {
        Self {
            id,
            remote_addr,
            created_at: Instant::now(),
            created_wall: SystemTime::now(),
            last_activity_ms: AtomicU64::new(0),
            missed_probes: AtomicU32::new(0),
            state: AtomicU8::new(ConnectionState::Open as u8),
            sink: Box::new(sink),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move `Open -> Closing`. Returns false if the connection was not open.
    pub fn begin_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed` from any state, returning the previous state
    pub fn mark_closed(&self) -> ConnectionState {
        ConnectionState::from_u8(
            self.state
                .swap(ConnectionState::Closed as u8, Ordering::AcqRel),
        )
    }

    /// Record inbound traffic now
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Record inbound traffic at `now` and reset the missed-probe count
    pub fn touch_at(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.created_at).as_millis() as u64;
        self.last_activity_ms.fetch_max(offset, Ordering::AcqRel);
        self.missed_probes.store(0, Ordering::Release);
    }

    pub fn last_activity(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_activity_ms.load(Ordering::Acquire))
    }

    /// Time since the last inbound traffic, measured at `now`
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// Consecutive probes sent without any inbound traffic in between
    pub fn missed_probes(&self) -> u32 {
        self.missed_probes.load(Ordering::Acquire)
    }

    /// Send a liveness probe and count it as outstanding
    pub fn probe(&self) -> Result<(), RelayError> {
        // counted before queueing so a fast reply always resets it
        self.missed_probes.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.send(Outbound::Probe) {
            let _ = self
                .missed_probes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    Some(n.saturating_sub(1))
                });
            return Err(e);
        }
        Ok(())
    }

    /// Queue a frame for this connection
    pub fn send(&self, frame: Outbound) -> Result<(), RelayError> {
        self.sink
            .send(frame)
            .map_err(|e| RelayError::write_failure(self.id.as_str(), e.to_string()))
    }

    /// Ask the transport to close; failures are ignored since the peer may be gone
    pub(crate) fn close_transport(&self) {
        let _ = self.sink.send(Outbound::Close);
    }

    /// Serializable view of this connection
    pub fn info(&self) -> ConnectionInfo {
        let now = Instant::now();
        ConnectionInfo {
            id: self.id.clone(),
            remote_addr: self.remote_addr,
            state: self.state(),
            connected_at: self.created_wall,
            age_ms: now.saturating_duration_since(self.created_at).as_millis() as u64,
            idle_ms: self.idle_for(now).as_millis() as u64,
            missed_probes: self.missed_probes(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .field("missed_probes", &self.missed_probes())
            .finish()
    }
}

/// Connection information for the management API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub state: ConnectionState,
    pub connected_at: SystemTime,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub missed_probes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, OnceLock};

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_state_transitions_are_one_way() {
        let (sink, _rx) = ChannelSink::channel(4);
        let conn = Connection::new(addr(), sink);
        assert!(conn.is_open());

        assert!(conn.begin_closing());
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(!conn.begin_closing());

        assert_eq!(conn.mark_closed(), ConnectionState::Closing);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.begin_closing());
    }

    #[test]
    fn test_hard_error_goes_straight_to_closed() {
        let (sink, _rx) = ChannelSink::channel(4);
        let conn = Connection::new(addr(), sink);
        assert_eq!(conn.mark_closed(), ConnectionState::Open);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_touch_resets_missed_probes() {
        let (sink, _rx) = ChannelSink::channel(4);
        let conn = Connection::new(addr(), sink);
        conn.probe().unwrap();
        conn.probe().unwrap();
        assert_eq!(conn.missed_probes(), 2);

        conn.touch();
        assert_eq!(conn.missed_probes(), 0);
    }

    #[test]
    fn test_idle_time_tracks_last_activity() {
        let (sink, _rx) = ChannelSink::channel(4);
        let conn = Connection::new(addr(), sink);
        let t0 = conn.created_at();

        conn.touch_at(t0 + Duration::from_secs(2));
        assert_eq!(conn.idle_for(t0 + Duration::from_secs(5)), Duration::from_secs(3));

        // an older timestamp never moves activity backwards
        conn.touch_at(t0 + Duration::from_secs(1));
        assert_eq!(conn.idle_for(t0 + Duration::from_secs(5)), Duration::from_secs(3));
    }

    #[test]
    fn test_full_queue_is_write_failure() {
        let (sink, _rx) = ChannelSink::channel(1);
        let conn = Connection::new(addr(), sink);
        assert!(conn.send(Outbound::Text("one".into())).is_ok());

        let err = conn.send(Outbound::Text("two".into())).unwrap_err();
        assert!(matches!(err, RelayError::TransportWriteFailure { .. }));
    }

    #[test]
    fn test_dropped_receiver_is_write_failure() {
        let (sink, rx) = ChannelSink::channel(4);
        let conn = Connection::new(addr(), sink);
        drop(rx);
        assert!(conn.probe().is_err());
        assert_eq!(conn.missed_probes(), 0);
    }

    /// Sink that answers every probe immediately, as a fast peer would
    struct EchoSink(Arc<OnceLock<Arc<Connection>>>);

    impl ConnectionSink for EchoSink {
        fn send(&self, frame: Outbound) -> Result<(), SinkError> {
            if frame == Outbound::Probe {
                if let Some(conn) = self.0.get() {
                    conn.touch();
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_reply_during_probe_is_not_counted_missed() {
        let slot = Arc::new(OnceLock::new());
        let conn = Arc::new(Connection::new(addr(), EchoSink(Arc::clone(&slot))));
        let _ = slot.set(Arc::clone(&conn));

        conn.probe().unwrap();
        assert_eq!(conn.missed_probes(), 0);
    }
}

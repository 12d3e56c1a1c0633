//! Connection Management Module
//!
//! Connection records, the registry that owns them, and the liveness
//! monitor that evicts dead peers.

pub mod liveness;
pub mod registry;
pub mod types;

pub use liveness::{EvictionReason, LivenessMonitor, SweepReport};
pub use registry::{BroadcastReport, ConnectionRegistry};
pub use types::{
    ChannelSink, Connection, ConnectionId, ConnectionInfo, ConnectionSink, ConnectionState,
    Outbound, SinkError,
};

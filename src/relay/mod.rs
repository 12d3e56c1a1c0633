//! Chat Relay Module
//!
//! Inbound message handling, per-socket sessions and periodic announcements.

pub mod announcer;
pub mod engine;
pub mod session;

pub use announcer::Announcer;
pub use engine::RelayEngine;
pub use session::run_session;

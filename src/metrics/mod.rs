//! Metrics Module
//!
//! Handles relay metrics collection and Prometheus export.

pub mod collector;

pub use collector::RelayMetrics;

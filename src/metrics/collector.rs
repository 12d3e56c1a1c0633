//! Metrics Collector

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Collects relay counters and exports them in Prometheus text format
pub struct RelayMetrics {
    registry: Registry,
    connections_total: IntCounter,
    active_connections: IntGauge,
    messages_relayed_total: IntCounter,
    write_failures_total: IntCounter,
    evictions_total: IntCounter,
    persistence_failures_total: IntCounter,
    protocol_violations_total: IntCounter,
}

impl RelayMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_total = register_counter(
            &registry,
            "chatrelay_connections_total",
            "Total number of registered connections",
        );
        let active_connections = IntGauge::new(
            "chatrelay_active_connections",
            "Number of connections currently in the registry",
        )
        .expect("Failed to create active_connections gauge");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("Failed to register active_connections");
        let messages_relayed_total = register_counter(
            &registry,
            "chatrelay_messages_relayed_total",
            "Total chat messages fanned out",
        );
        let write_failures_total = register_counter(
            &registry,
            "chatrelay_write_failures_total",
            "Total per-connection write failures",
        );
        let evictions_total = register_counter(
            &registry,
            "chatrelay_evictions_total",
            "Total connections evicted by the liveness monitor",
        );
        let persistence_failures_total = register_counter(
            &registry,
            "chatrelay_persistence_failures_total",
            "Total chat messages the store failed to persist",
        );
        let protocol_violations_total = register_counter(
            &registry,
            "chatrelay_protocol_violations_total",
            "Total malformed inbound payloads",
        );

        Self {
            registry,
            connections_total,
            active_connections,
            messages_relayed_total,
            write_failures_total,
            evictions_total,
            persistence_failures_total,
            protocol_violations_total,
        }
    }

    pub fn connection_registered(&self) {
        self.connections_total.inc();
        self.active_connections.inc();
    }

    pub fn connection_removed(&self) {
        self.active_connections.dec();
    }

    pub fn message_relayed(&self) {
        self.messages_relayed_total.inc();
    }

    pub fn write_failed(&self) {
        self.write_failures_total.inc();
    }

    pub fn connection_evicted(&self) {
        self.evictions_total.inc();
    }

    pub fn persistence_failed(&self) {
        self.persistence_failures_total.inc();
    }

    pub fn protocol_violation(&self) {
        self.protocol_violations_total.inc();
    }

    pub fn total_connections(&self) -> u64 {
        self.connections_total.get()
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.get()
    }

    pub fn messages_relayed(&self) -> u64 {
        self.messages_relayed_total.get()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions_total.get()
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures_total.get()
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations_total.get()
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help)
        .unwrap_or_else(|e| panic!("Failed to create {} counter: {}", name, e));
    registry
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("Failed to register {}: {}", name, e));
    counter
}

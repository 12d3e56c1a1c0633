//! Tests for liveness probing and eviction

use std::sync::Arc;
use std::time::Duration;

use chatrelay::config::LivenessConfig;
use chatrelay::connection::{
    ChannelSink, Connection, ConnectionId, ConnectionRegistry, EvictionReason, LivenessMonitor,
    Outbound,
};
use chatrelay::metrics::RelayMetrics;
use tokio::sync::mpsc;

const T: Duration = Duration::from_secs(3);

fn setup(config: LivenessConfig) -> (Arc<ConnectionRegistry>, LivenessMonitor) {
    let registry = Arc::new(ConnectionRegistry::new(64, Arc::new(RelayMetrics::new())));
    let monitor = LivenessMonitor::new(Arc::clone(&registry), config);
    (registry, monitor)
}

async fn register(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::Receiver<Outbound>) {
    let (sink, rx) = ChannelSink::channel(32);
    let conn = Connection::new("127.0.0.1:31000".parse().unwrap(), sink);
    (registry.register(conn).await.unwrap(), rx)
}

#[tokio::test]
async fn test_silent_connection_evicted_after_max_missed_probes() {
    let (registry, monitor) = setup(LivenessConfig {
        probe_interval: T,
        idle_timeout: Duration::from_secs(3600),
        max_missed_probes: 2,
    });
    let (silent, _rx) = register(&registry).await;

    // three unanswered probes go out before the fourth sweep evicts
    for _ in 0..3 {
        let report = monitor.sweep().await;
        assert!(!report.was_evicted(&silent));
    }
    let report = monitor.sweep().await;

    assert_eq!(report.evicted, vec![(silent.clone(), EvictionReason::MissedProbes)]);
    assert!(registry.get(&silent).await.is_none());
    assert_eq!(registry.metrics().evictions(), 1);
}

#[tokio::test]
async fn test_responding_connection_resets_missed_probes() {
    let (registry, monitor) = setup(LivenessConfig {
        probe_interval: T,
        idle_timeout: Duration::from_secs(3600),
        max_missed_probes: 1,
    });
    let (chatty, _rx) = register(&registry).await;

    for _ in 0..10 {
        monitor.sweep().await;
        let conn = registry.get(&chatty).await.expect("evicted despite replies");
        assert_eq!(conn.missed_probes(), 1);
        // pong observed by the transport
        assert!(registry.touch(&chatty).await);
        assert_eq!(conn.missed_probes(), 0);
    }
}

#[tokio::test]
async fn test_idle_past_two_intervals_evicted_recent_activity_kept() {
    let (registry, monitor) = setup(LivenessConfig {
        probe_interval: T,
        idle_timeout: T * 2,
        max_missed_probes: 10,
    });
    let (idle, _idle_rx) = register(&registry).await;
    let (active, _active_rx) = register(&registry).await;

    let idle_conn = registry.get(&idle).await.unwrap();
    let active_conn = registry.get(&active).await.unwrap();
    let epsilon = Duration::from_millis(100);

    // activity at T - epsilon since the idle connection was created
    active_conn.touch_at(idle_conn.created_at() + T - epsilon);

    let tick = idle_conn.created_at() + T * 2 + epsilon;
    let report = monitor.sweep_at(tick).await;

    assert_eq!(report.evicted, vec![(idle.clone(), EvictionReason::IdleTimeout)]);
    assert_eq!(report.probed, 1);
    assert!(registry.get(&idle).await.is_none());
    assert!(registry.get(&active).await.is_some());
}

#[tokio::test]
async fn test_probe_write_failure_evicts_immediately() {
    let (registry, monitor) = setup(LivenessConfig::default());
    let (dead, rx) = register(&registry).await;
    let (alive, mut alive_rx) = register(&registry).await;
    drop(rx);

    let report = monitor.sweep().await;

    assert_eq!(report.evicted, vec![(dead.clone(), EvictionReason::ProbeFailed)]);
    assert!(registry.get(&alive).await.is_some());
    assert_eq!(alive_rx.try_recv().unwrap(), Outbound::Probe);
}

#[tokio::test]
async fn test_spawned_monitor_sweeps_on_interval() {
    let (registry, monitor) = setup(LivenessConfig {
        probe_interval: Duration::from_millis(20),
        idle_timeout: Duration::from_secs(60),
        max_missed_probes: 100,
    });
    let (_id, mut rx) = register(&registry).await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let handle = monitor.spawn(shutdown_rx);
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no probe within timeout");
    assert_eq!(frame, Some(Outbound::Probe));

    shutdown_tx.send(()).unwrap();
    tokio_test::assert_ok!(handle.await);
}

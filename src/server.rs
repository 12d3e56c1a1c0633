//! Chat Server
//!
//! Wires the registry, chat store, relay engine and HTTP router together and
//! owns the background tasks that must be cancelled on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connection::{ConnectionRegistry, LivenessMonitor};
use crate::management::{AppState, ManagementApi};
use crate::metrics::RelayMetrics;
use crate::relay::{Announcer, RelayEngine};
use crate::shutdown::ShutdownCoordinator;
use crate::storage::{create_store, ChatStore};
use crate::Result;

/// Chat relay server, ready to bind
pub struct ChatServer {
    config: Arc<Config>,
    engine: RelayEngine,
}

impl ChatServer {
    /// Create a server using the store selected by `config`
    pub async fn new(config: Config) -> Result<Self> {
        let store = create_store(&config.storage)
            .await
            .context("Failed to initialise chat store")?;
        Ok(Self::with_store(config, store))
    }

    /// Create a server around an existing chat store
    pub fn with_store(config: Config, store: Arc<dyn ChatStore>) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new(
            config.server.max_connections,
            metrics,
        ));
        let engine = RelayEngine::new(registry, store);

        Self {
            config: Arc::new(config),
            engine,
        }
    }

    pub fn engine(&self) -> &RelayEngine {
        &self.engine
    }

    /// Router with all routes, used directly by tests
    pub fn router(&self) -> Router {
        ManagementApi::create_router(AppState {
            engine: self.engine.clone(),
            config: Arc::clone(&self.config),
            start_time: SystemTime::now(),
        })
    }

    /// Bind the listener and start serving plus the periodic tasks
    pub async fn start(self, coordinator: &ShutdownCoordinator) -> Result<ServerHandle> {
        let bind_addr = self.config.server.bind_addr;
        info!("Binding WebSocket listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind chat server to {}", bind_addr))?;
        let local_addr = listener.local_addr()?;

        let monitor = LivenessMonitor::new(
            Arc::clone(self.engine.registry()),
            self.config.liveness.clone(),
        );
        let liveness_task = monitor.spawn(coordinator.subscribe());

        let announce_task = if self.config.announce.enabled {
            let announcer = Announcer::new(
                self.engine.clone(),
                self.config.announce.message.clone(),
                self.config.announce.interval,
            );
            Some(announcer.spawn(coordinator.subscribe()))
        } else {
            None
        };

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut shutdown_rx = coordinator.subscribe();
        let server_task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!("Chat server error: {}", e);
            }
        });

        info!(
            "Chat relay listening on {}{}",
            local_addr, self.config.server.ws_path
        );

        Ok(ServerHandle {
            local_addr,
            engine: self.engine,
            shutdown_timeout: self.config.server.shutdown_timeout,
            server_task,
            liveness_task,
            announce_task,
        })
    }
}

/// Running server and the tasks it spawned
pub struct ServerHandle {
    local_addr: SocketAddr,
    engine: RelayEngine,
    shutdown_timeout: Duration,
    server_task: JoinHandle<()>,
    liveness_task: JoinHandle<()>,
    announce_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &RelayEngine {
        &self.engine
    }

    /// Close every connection, then join the periodic tasks and the HTTP
    /// server. The shutdown signal must already have been broadcast.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let closed = self.engine.registry().close_all().await;
        info!("Closed {} connections for shutdown", closed);

        let mut tasks = vec![("liveness monitor", self.liveness_task)];
        if let Some(task) = self.announce_task {
            tasks.push(("announcer", task));
        }
        tasks.push(("http server", self.server_task));

        for (name, mut task) in tasks {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => info!("{} stopped", name),
                Ok(Err(e)) if e.is_cancelled() => info!("{} cancelled", name),
                Ok(Err(e)) => error!("{} failed: {}", name, e),
                Err(_) => {
                    warn!(
                        "{} did not stop within {:?}, aborting",
                        name, self.shutdown_timeout
                    );
                    task.abort();
                }
            }
        }
        Ok(())
    }
}

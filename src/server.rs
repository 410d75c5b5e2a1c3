use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::auth::TokenAuthority;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    ConnectionId, ErrorCode, ServerMessage, DEFAULT_MAX_VIEWERS, DEFAULT_TOKEN_TTL_SECS,
};

mod connection_manager;
mod message_router;
mod node_registry;
mod relay_service;
mod session;

use connection_manager::ConnectionRegistry;
use node_registry::NodeRegistry;

pub use connection_manager::BindError;
pub use node_registry::{Node, NodeError};
pub use session::SessionError;

#[derive(Debug, Error)]
pub enum RegisterClientError {
    #[error("Too many connections from your IP ({current}/{limit})")]
    IpLimitExceeded { current: usize, limit: usize },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Viewer capacity per node.
    pub max_viewers: u8,
    /// Capability token lifetime.
    pub token_ttl: Duration,
    /// A connection is dropped by the liveness sweep when it has been
    /// silent for longer than this.
    pub ping_timeout: Duration,
    /// Interval between liveness sweeps.
    pub sweep_interval: Duration,
    pub max_message_size: usize,
    pub max_connections_per_ip: usize,
    /// Capacity of each connection's outbound message queue.
    pub send_queue_capacity: usize,
    /// Optional fixed token signing key; a random key is generated when
    /// absent (tokens then die with the process, like the registry).
    pub token_secret: Option<[u8; 32]>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_viewers: DEFAULT_MAX_VIEWERS,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            ping_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            max_message_size: 65536, // 64KB
            max_connections_per_ip: 16,
            send_queue_capacity: 64,
            token_secret: None,
        }
    }
}

/// The relay: owns the node registry, the connection registry, and the
/// token authority, and routes every inbound message.
pub struct RelayServer {
    nodes: NodeRegistry,
    connections: ConnectionRegistry,
    tokens: TokenAuthority,
    config: ServerConfig,
    metrics: Arc<ServerMetrics>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let ttl = ChronoDuration::seconds(config.token_ttl.as_secs() as i64);
        let tokens = match config.token_secret {
            Some(key) => TokenAuthority::new(key, ttl),
            None => TokenAuthority::with_random_key(ttl)
                .map_err(|e| anyhow::anyhow!("failed to initialize token authority: {e}"))?,
        };

        Ok(Arc::new(Self {
            nodes: NodeRegistry::new(config.max_viewers),
            connections: ConnectionRegistry::new(config.max_connections_per_ip),
            tokens,
            config,
            metrics: Arc::new(ServerMetrics::new()),
        }))
    }

    /// Register a new client connection
    pub fn register_client(
        &self,
        sender: mpsc::Sender<Arc<ServerMessage>>,
        client_addr: SocketAddr,
    ) -> Result<ConnectionId, RegisterClientError> {
        let connection_id = self.connections.register(sender, client_addr)?;
        self.metrics.increment_connections();
        Ok(connection_id)
    }

    /// Unregister a client connection, releasing its viewer slot (if any)
    /// and notifying the node's publisher of the new viewer count.
    pub async fn unregister_client(&self, connection_id: &ConnectionId) {
        let Some((binding, new_count)) = self.connections.remove(connection_id, &self.nodes)
        else {
            return;
        };
        self.metrics.decrement_active_connections();

        if let Some(binding) = binding {
            tracing::info!(
                %connection_id,
                node_id = %binding.node_id,
                role = %binding.role,
                "Bound connection closed"
            );
            if let Some(count) = new_count {
                self.metrics.increment_viewers_left();
                self.notify_viewer_count(&binding.node_id, count);
            }
        } else {
            tracing::info!(%connection_id, "Connection closed");
        }
    }

    /// Report a transport-level failure back to a connection as an `error`
    /// frame. The connection stays open.
    pub fn send_error_frame(&self, connection_id: &ConnectionId, code: ErrorCode) {
        self.send_error_to(connection_id, code);
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }

    /// Periodic liveness sweep: drop connections whose last ping is older
    /// than the configured timeout. Dropping the registry entry closes the
    /// outbound channel, which in turn ends the connection's socket tasks.
    pub async fn cleanup_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let expired = self.connections.collect_expired(self.config.ping_timeout);
            for connection_id in expired {
                tracing::info!(%connection_id, "Dropping silent connection");
                self.unregister_client(&connection_id).await;
            }
        }
    }
}

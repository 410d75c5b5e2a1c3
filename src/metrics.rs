use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, exposed as JSON via the metrics endpoint.
///
/// Counters only; no histograms and no external metrics backend. Everything
/// here is advisory and reset by a restart, like the registries themselves.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    connections_total: AtomicU64,
    active_connections: AtomicU64,
    nodes_created: AtomicU64,
    nodes_revoked: AtomicU64,
    viewers_joined: AtomicU64,
    viewers_left: AtomicU64,
    messages_relayed: AtomicU64,
    heartbeats: AtomicU64,
    errors_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub active_connections: u64,
    pub nodes_created: u64,
    pub nodes_revoked: u64,
    pub viewers_joined: u64,
    pub viewers_left: u64,
    pub messages_relayed: u64,
    pub heartbeats: u64,
    pub errors_sent: u64,
    pub messages_dropped: u64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_connections(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        // Saturating decrement: double-unregister must not wrap.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn increment_nodes_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_nodes_revoked(&self) {
        self.nodes_revoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_viewers_joined(&self) {
        self.viewers_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_viewers_left(&self) {
        self.viewers_left.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_messages_relayed(&self, count: u64) {
        self.messages_relayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_heartbeats(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors_sent(&self) {
        self.errors_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_messages_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_revoked: self.nodes_revoked.load(Ordering::Relaxed),
            viewers_joined: self.viewers_joined.load(Ordering::Relaxed),
            viewers_left: self.viewers_left.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            errors_sent: self.errors_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

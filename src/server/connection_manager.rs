use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::protocol::{BoundRole, ConnectionId, NodeId, ServerMessage};

use super::node_registry::{NodeError, NodeRegistry};
use super::RegisterClientError;

/// The (node, role) pair a connection has bound to. Fixed for the
/// connection's lifetime once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Binding {
    pub node_id: NodeId,
    pub role: BoundRole,
}

#[derive(Debug, Clone)]
pub(crate) struct ClientConnection {
    pub sender: mpsc::Sender<Arc<ServerMessage>>,
    pub client_addr: SocketAddr,
    pub last_ping: Instant,
    pub binding: Option<Binding>,
}

/// Per-node index of bound connections: one publisher slot, a viewer set.
#[derive(Debug, Default)]
struct NodePeers {
    publisher: Option<ConnectionId>,
    viewers: HashSet<ConnectionId>,
}

impl NodePeers {
    fn is_empty(&self) -> bool {
        self.publisher.is_none() && self.viewers.is_empty()
    }
}

/// Errors produced while binding a connection to a (node, role) pair.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    /// The connection already holds a binding; re-binding is rejected, not
    /// silently overwritten.
    #[error("connection is already bound to a node")]
    AlreadyBound,
    /// Another connection already holds the publisher slot for this node.
    #[error("node already has a bound publisher")]
    PublisherTaken,
    #[error(transparent)]
    Node(#[from] NodeError),
    /// The connection disappeared mid-bind (already closed).
    #[error("connection is no longer registered")]
    ConnectionGone,
}

/// Tracks every live transport connection and the (node, role) it has bound
/// to, if any, plus per-IP connection accounting.
pub(crate) struct ConnectionRegistry {
    clients: DashMap<ConnectionId, ClientConnection>,
    peers: DashMap<NodeId, NodePeers>,
    connections_per_ip: DashMap<IpAddr, usize>,
    max_connections_per_ip: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections_per_ip: usize) -> Self {
        Self {
            clients: DashMap::new(),
            peers: DashMap::new(),
            connections_per_ip: DashMap::new(),
            max_connections_per_ip,
        }
    }

    pub fn register(
        &self,
        sender: mpsc::Sender<Arc<ServerMessage>>,
        client_addr: SocketAddr,
    ) -> Result<ConnectionId, RegisterClientError> {
        let ip = client_addr.ip();
        if let Err(current) = self.try_reserve_ip_slot(ip) {
            warn!(
                %ip,
                current,
                max = self.max_connections_per_ip,
                "IP connection limit exceeded"
            );
            return Err(RegisterClientError::IpLimitExceeded {
                current,
                limit: self.max_connections_per_ip,
            });
        }

        let connection_id = Uuid::new_v4();
        self.clients.insert(
            connection_id,
            ClientConnection {
                sender,
                client_addr,
                last_ping: Instant::now(),
                binding: None,
            },
        );

        info!(%connection_id, %client_addr, "Connection registered");
        Ok(connection_id)
    }

    pub fn record_ping(&self, connection_id: &ConnectionId) {
        if let Some(mut client) = self.clients.get_mut(connection_id) {
            client.last_ping = Instant::now();
        }
    }

    pub fn binding(&self, connection_id: &ConnectionId) -> Option<Binding> {
        self.clients
            .get(connection_id)
            .and_then(|client| client.binding)
    }

    pub fn sender_of(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<mpsc::Sender<Arc<ServerMessage>>> {
        self.clients
            .get(connection_id)
            .map(|client| client.sender.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// `Unbound -> Publisher(node)`. The peers entry guard is held across
    /// the slot check and write, so two concurrent publishers race for one
    /// winner and the loser gets `PublisherTaken`.
    pub fn bind_publisher(
        &self,
        connection_id: &ConnectionId,
        node_id: NodeId,
    ) -> Result<(), BindError> {
        self.ensure_unbound(connection_id)?;

        let mut peers = self.peers.entry(node_id).or_default();
        if peers.publisher.is_some() {
            return Err(BindError::PublisherTaken);
        }
        peers.publisher = Some(*connection_id);
        self.set_binding(connection_id, node_id, BoundRole::Publisher);
        Ok(())
    }

    /// `Unbound -> Viewer(node)`. The registry increment happens under the
    /// peers entry guard, so the node's viewer count always equals the size
    /// of its bound-viewer set.
    pub fn bind_viewer(
        &self,
        connection_id: &ConnectionId,
        node_id: NodeId,
        nodes: &NodeRegistry,
    ) -> Result<u8, BindError> {
        self.ensure_unbound(connection_id)?;

        let mut peers = self.peers.entry(node_id).or_default();
        let count = match nodes.try_increment_viewer(&node_id) {
            Ok(count) => count,
            Err(err) => {
                // Do not leave behind an empty entry created by this attempt.
                let empty = peers.is_empty();
                drop(peers);
                if empty {
                    self.peers.remove_if(&node_id, |_, p| p.is_empty());
                }
                return Err(err.into());
            }
        };
        peers.viewers.insert(*connection_id);
        self.set_binding(connection_id, node_id, BoundRole::Viewer);
        Ok(count)
    }

    /// Remove a connection, releasing its IP slot and any bound role.
    /// Returns the released binding and, for viewers, the node's new count.
    /// Idempotent: a second removal of the same id is a no-op.
    pub fn remove(
        &self,
        connection_id: &ConnectionId,
        nodes: &NodeRegistry,
    ) -> Option<(Option<Binding>, Option<u8>)> {
        let (_, connection) = self.clients.remove(connection_id)?;
        self.release_ip_slot(connection.client_addr.ip());

        let Some(binding) = connection.binding else {
            return Some((None, None));
        };

        let mut new_count = None;
        if let Some(mut peers) = self.peers.get_mut(&binding.node_id) {
            match binding.role {
                BoundRole::Publisher => {
                    if peers.publisher == Some(*connection_id) {
                        peers.publisher = None;
                    }
                }
                BoundRole::Viewer => {
                    if peers.viewers.remove(connection_id) {
                        new_count = nodes.decrement_viewer(&binding.node_id);
                    }
                }
            }
            let empty = peers.is_empty();
            drop(peers);
            if empty {
                self.peers.remove_if(&binding.node_id, |_, p| p.is_empty());
            }
        }

        Some((Some(binding), new_count))
    }

    /// Sender for the node's bound publisher, if one exists.
    pub fn publisher_sender(&self, node_id: &NodeId) -> Option<mpsc::Sender<Arc<ServerMessage>>> {
        let peers = self.peers.get(node_id)?;
        let publisher = peers.publisher?;
        self.clients
            .get(&publisher)
            .map(|client| client.sender.clone())
    }

    /// Senders for every connection currently bound to the node with the
    /// given role, excluding `except` when provided.
    pub fn role_senders(
        &self,
        node_id: &NodeId,
        role: BoundRole,
        except: Option<&ConnectionId>,
    ) -> Vec<mpsc::Sender<Arc<ServerMessage>>> {
        let Some(peers) = self.peers.get(node_id) else {
            return Vec::new();
        };
        let ids: Vec<ConnectionId> = match role {
            BoundRole::Publisher => peers.publisher.into_iter().collect(),
            BoundRole::Viewer => peers.viewers.iter().copied().collect(),
        };
        drop(peers);

        ids.iter()
            .filter(|id| except != Some(*id))
            .filter_map(|id| self.clients.get(id).map(|client| client.sender.clone()))
            .collect()
    }

    /// Senders for every connection bound to the node, publisher and
    /// viewers alike (used for `revoke` broadcasts).
    pub fn bound_senders(&self, node_id: &NodeId) -> Vec<mpsc::Sender<Arc<ServerMessage>>> {
        let mut senders = self.role_senders(node_id, BoundRole::Publisher, None);
        senders.extend(self.role_senders(node_id, BoundRole::Viewer, None));
        senders
    }

    /// Connections whose last ping is older than `timeout`, for the
    /// liveness sweep.
    pub fn collect_expired(&self, timeout: std::time::Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        self.clients
            .iter()
            .filter_map(|entry| {
                if now.duration_since(entry.last_ping) > timeout {
                    Some(*entry.key())
                } else {
                    None
                }
            })
            .collect()
    }

    fn ensure_unbound(&self, connection_id: &ConnectionId) -> Result<(), BindError> {
        let client = self
            .clients
            .get(connection_id)
            .ok_or(BindError::ConnectionGone)?;
        if client.binding.is_some() {
            return Err(BindError::AlreadyBound);
        }
        Ok(())
    }

    fn set_binding(&self, connection_id: &ConnectionId, node_id: NodeId, role: BoundRole) {
        if let Some(mut client) = self.clients.get_mut(connection_id) {
            client.binding = Some(Binding { node_id, role });
        }
    }

    fn try_reserve_ip_slot(&self, ip: IpAddr) -> Result<usize, usize> {
        match self.connections_per_ip.entry(ip) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current >= self.max_connections_per_ip {
                    Err(current)
                } else {
                    let count = entry.get_mut();
                    *count += 1;
                    Ok(*count)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                if self.max_connections_per_ip == 0 {
                    Err(0)
                } else {
                    entry.insert(1);
                    Ok(1)
                }
            }
        }
    }

    fn release_ip_slot(&self, ip: IpAddr) {
        if let Some(mut entry) = self.connections_per_ip.get_mut(&ip) {
            if *entry > 1 {
                *entry -= 1;
                return;
            }
        }
        self.connections_per_ip.remove(&ip);
    }
}

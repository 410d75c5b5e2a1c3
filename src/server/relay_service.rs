use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::auth::Role;
use crate::protocol::{BoundRole, ConnectionId, ErrorCode, NodeId, ServerMessage};

use super::connection_manager::BindError;
use super::node_registry::NodeError;
use super::RelayServer;

/// Opaque negotiation message kinds that are forwarded verbatim.
#[derive(Debug, Clone, Copy)]
pub(super) enum SignalKind {
    Offer,
    Answer,
    Ice,
}

impl SignalKind {
    fn into_message(self, payload: serde_json::Value) -> ServerMessage {
        match self {
            Self::Offer => ServerMessage::Offer { payload },
            Self::Answer => ServerMessage::Answer { payload },
            Self::Ice => ServerMessage::Ice { payload },
        }
    }
}

impl RelayServer {
    /// `publish{node_id, owner_token}`: bind the connection as the node's
    /// publisher. Publishing is single-writer; a second publisher is
    /// rejected with `RoleConflict`, never preempted.
    pub(super) async fn handle_publish(
        &self,
        connection_id: &ConnectionId,
        node_id: NodeId,
        owner_token: &str,
    ) {
        let claims = match self.tokens.verify(owner_token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(%connection_id, %node_id, error = %err, "Publish rejected: bad token");
                self.send_error_to(connection_id, ErrorCode::InvalidToken);
                return;
            }
        };

        if claims.role != Role::Owner || claims.node_id != node_id {
            tracing::warn!(%connection_id, %node_id, "Publish rejected: token scope mismatch");
            self.send_error_to(connection_id, ErrorCode::InvalidToken);
            return;
        }

        match self.nodes.get(&node_id) {
            None => {
                self.send_error_to(connection_id, ErrorCode::NodeNotFound);
                return;
            }
            Some(node) if !node.is_active() => {
                self.send_error_to(connection_id, ErrorCode::NodeRevoked);
                return;
            }
            Some(_) => {}
        }

        match self.connections.bind_publisher(connection_id, node_id) {
            Ok(()) => {
                tracing::info!(%connection_id, %node_id, "Publisher bound");
                self.deliver_to(
                    connection_id,
                    ServerMessage::Connected {
                        role: BoundRole::Publisher,
                    },
                );
            }
            Err(err) => {
                tracing::warn!(%connection_id, %node_id, error = %err, "Publisher bind failed");
                self.send_error_to(connection_id, bind_error_code(&err));
            }
        }
    }

    /// `join{node_id, viewer_token}`: bind the connection as a viewer.
    /// Capacity is checked here authoritatively, regardless of how many
    /// tokens were minted. On success the publisher learns the new count
    /// and receives the viewer's token so it can initiate negotiation.
    pub(super) async fn handle_join(
        &self,
        connection_id: &ConnectionId,
        node_id: NodeId,
        viewer_token: &str,
    ) {
        let claims = match self.tokens.verify(viewer_token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(%connection_id, %node_id, error = %err, "Join rejected: bad token");
                self.send_error_to(connection_id, ErrorCode::InvalidToken);
                return;
            }
        };

        if claims.role != Role::Viewer || claims.node_id != node_id {
            tracing::warn!(%connection_id, %node_id, "Join rejected: token scope mismatch");
            self.send_error_to(connection_id, ErrorCode::InvalidToken);
            return;
        }

        let count = match self
            .connections
            .bind_viewer(connection_id, node_id, &self.nodes)
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(%connection_id, %node_id, error = %err, "Viewer bind failed");
                self.send_error_to(connection_id, bind_error_code(&err));
                return;
            }
        };

        self.metrics.increment_viewers_joined();
        tracing::info!(%connection_id, %node_id, count, "Viewer bound");

        self.deliver_to(
            connection_id,
            ServerMessage::Connected {
                role: BoundRole::Viewer,
            },
        );

        // Count first, then the join notification the publisher reacts to.
        if let Some(publisher) = self.connections.publisher_sender(&node_id) {
            self.deliver(&publisher, ServerMessage::ViewerCount { node_id, count });
            self.deliver(
                &publisher,
                ServerMessage::Join {
                    viewer_token: viewer_token.to_string(),
                },
            );
        }
    }

    /// `offer`/`answer`/`ice`: forwarded verbatim to every connection of
    /// the opposite role bound to the sender's node. Routing trusts the
    /// binding, not the client-supplied node id.
    pub(super) async fn relay_signal(
        &self,
        connection_id: &ConnectionId,
        kind: SignalKind,
        payload: serde_json::Value,
    ) {
        let Some(binding) = self.connections.binding(connection_id) else {
            self.send_error_to(connection_id, ErrorCode::NotRegistered);
            return;
        };

        let opposite = match binding.role {
            BoundRole::Publisher => BoundRole::Viewer,
            BoundRole::Viewer => BoundRole::Publisher,
        };
        let targets =
            self.connections
                .role_senders(&binding.node_id, opposite, Some(connection_id));
        if targets.is_empty() {
            tracing::debug!(
                %connection_id,
                node_id = %binding.node_id,
                ?kind,
                "No opposite-role connection bound; signal dropped"
            );
            return;
        }

        let message = Arc::new(kind.into_message(payload));
        for sender in &targets {
            self.deliver_arc(sender, Arc::clone(&message));
        }
        self.metrics.add_messages_relayed(targets.len() as u64);
    }

    /// `heartbeat`: publisher-only liveness beacon, fanned out to all bound
    /// viewers with a server-assigned timestamp. Never persisted.
    pub(super) async fn handle_heartbeat(
        &self,
        connection_id: &ConnectionId,
        payload: serde_json::Value,
    ) {
        let Some(binding) = self.connections.binding(connection_id) else {
            self.send_error_to(connection_id, ErrorCode::NotRegistered);
            return;
        };
        if binding.role != BoundRole::Publisher {
            self.send_error_to(connection_id, ErrorCode::RoleNotAllowed);
            return;
        }

        let message = Arc::new(ServerMessage::Heartbeat {
            node_id: binding.node_id,
            timestamp: Utc::now(),
            payload,
        });
        for sender in self
            .connections
            .role_senders(&binding.node_id, BoundRole::Viewer, None)
        {
            self.deliver_arc(&sender, Arc::clone(&message));
        }
        self.metrics.increment_heartbeats();
    }

    /// `ping`: pure keepalive, independent of binding state.
    pub(super) async fn handle_ping(&self, connection_id: &ConnectionId) {
        self.deliver_to(
            connection_id,
            ServerMessage::Pong {
                timestamp: Utc::now(),
            },
        );
    }

    /// Broadcast the current viewer count to the node's publisher.
    pub(super) fn notify_viewer_count(&self, node_id: &NodeId, count: u8) {
        if let Some(publisher) = self.connections.publisher_sender(node_id) {
            self.deliver(
                &publisher,
                ServerMessage::ViewerCount {
                    node_id: *node_id,
                    count,
                },
            );
        }
    }

    /// Broadcast `revoke` to every connection bound to the node. Transports
    /// stay open; clients are expected to tear down voluntarily.
    pub(super) fn broadcast_revoke(&self, node_id: &NodeId) {
        let message = Arc::new(ServerMessage::Revoke { node_id: *node_id });
        for sender in self.connections.bound_senders(node_id) {
            self.deliver_arc(&sender, Arc::clone(&message));
        }
    }

    pub(super) fn send_error_to(&self, connection_id: &ConnectionId, code: ErrorCode) {
        self.metrics.increment_errors_sent();
        self.deliver_to(connection_id, ServerMessage::error(code));
    }

    pub(super) fn deliver_to(&self, connection_id: &ConnectionId, message: ServerMessage) {
        if let Some(sender) = self.connections.sender_of(connection_id) {
            self.deliver(&sender, message);
        }
    }

    fn deliver(&self, sender: &mpsc::Sender<Arc<ServerMessage>>, message: ServerMessage) {
        self.deliver_arc(sender, Arc::new(message));
    }

    /// Best-effort enqueue: a full or closed queue drops the message, it is
    /// never retried.
    fn deliver_arc(&self, sender: &mpsc::Sender<Arc<ServerMessage>>, message: Arc<ServerMessage>) {
        if sender.try_send(message).is_err() {
            self.metrics.increment_messages_dropped();
            tracing::warn!("Outbound queue full or closed; message dropped");
        }
    }
}

fn bind_error_code(err: &BindError) -> ErrorCode {
    match err {
        BindError::AlreadyBound | BindError::PublisherTaken => ErrorCode::RoleConflict,
        BindError::Node(NodeError::NotFound) => ErrorCode::NodeNotFound,
        BindError::Node(NodeError::Revoked) => ErrorCode::NodeRevoked,
        BindError::Node(NodeError::CapacityExceeded { .. }) => ErrorCode::CapacityExceeded,
        BindError::ConnectionGone => ErrorCode::InternalError,
    }
}

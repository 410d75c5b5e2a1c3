use crate::protocol::{ClientMessage, ConnectionId};

use super::relay_service::SignalKind;
use super::RelayServer;

impl RelayServer {
    /// Handle one inbound client message. Messages from a single connection
    /// arrive here in order; messages from different connections interleave
    /// freely.
    pub async fn handle_client_message(&self, connection_id: &ConnectionId, message: ClientMessage) {
        // Any inbound frame counts as liveness.
        self.connections.record_ping(connection_id);

        match message {
            ClientMessage::Publish {
                node_id,
                owner_token,
            } => {
                self.handle_publish(connection_id, node_id, &owner_token)
                    .await;
            }
            ClientMessage::Join {
                node_id,
                viewer_token,
            } => {
                self.handle_join(connection_id, node_id, &viewer_token)
                    .await;
            }
            ClientMessage::Offer { payload, .. } => {
                self.relay_signal(connection_id, SignalKind::Offer, payload)
                    .await;
            }
            ClientMessage::Answer { payload, .. } => {
                self.relay_signal(connection_id, SignalKind::Answer, payload)
                    .await;
            }
            ClientMessage::Ice { payload, .. } => {
                self.relay_signal(connection_id, SignalKind::Ice, payload)
                    .await;
            }
            ClientMessage::Heartbeat { payload, .. } => {
                self.handle_heartbeat(connection_id, payload).await;
            }
            ClientMessage::Ping => {
                self.handle_ping(connection_id).await;
            }
        }
    }
}

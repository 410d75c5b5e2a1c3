use thiserror::Error;

use crate::auth::TokenError;
use crate::protocol::NodeId;

use super::node_registry::{Node, NodeError};
use super::RelayServer;

/// Errors surfaced by the synchronous session API.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("failed to mint capability token: {0}")]
    Token(#[from] TokenError),
}

impl RelayServer {
    /// Create a node for a project and mint its owner token.
    pub fn create_node(&self, project_id: &str) -> Result<(Node, String), SessionError> {
        let node = self.nodes.create(project_id);
        let owner_token = self.tokens.issue_owner_token(node.id, project_id)?;
        self.metrics.increment_nodes_created();
        tracing::info!(node_id = %node.id, %project_id, "Node created");
        Ok((node, owner_token))
    }

    /// Mint a viewer token for an active, under-capacity node.
    ///
    /// The capacity check here is advisory only: issuing a token does not
    /// reserve a slot, and the authoritative check happens when the token
    /// is presented on `join`.
    pub fn mint_viewer_token(&self, node_id: &NodeId) -> Result<String, SessionError> {
        let node = self.nodes.get(node_id).ok_or(NodeError::NotFound)?;
        if !node.is_active() {
            return Err(NodeError::Revoked.into());
        }
        if node.viewer_count >= self.nodes.max_viewers() {
            return Err(NodeError::CapacityExceeded {
                limit: self.nodes.max_viewers(),
            }
            .into());
        }

        let token = self.tokens.issue_viewer_token(*node_id, &node.project_id)?;
        tracing::info!(%node_id, "Viewer token minted");
        Ok(token)
    }

    /// Revoke a node and broadcast `revoke` to every bound connection.
    /// Idempotent; bound transports are notified, never force-closed.
    pub async fn revoke_node(&self, node_id: &NodeId) -> Result<(), SessionError> {
        self.nodes.revoke(node_id).map_err(SessionError::Node)?;
        self.metrics.increment_nodes_revoked();
        tracing::info!(%node_id, "Node revoked");
        self.broadcast_revoke(node_id);
        Ok(())
    }

    /// Diagnostic snapshot of a node.
    pub fn node_status(&self, node_id: &NodeId) -> Option<Node> {
        self.nodes.get(node_id)
    }
}

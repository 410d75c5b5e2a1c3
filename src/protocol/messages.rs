use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error_codes::ErrorCode;
use super::types::{BoundRole, NodeId};

/// Message types sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Bind this connection as the node's publisher
    Publish {
        node_id: NodeId,
        /// Owner capability token minted at node creation
        owner_token: String,
    },
    /// Bind this connection as one of the node's viewers
    Join {
        node_id: NodeId,
        /// Viewer capability token minted via the session API
        viewer_token: String,
    },
    /// Session description offer, relayed opaquely to the opposite role
    Offer {
        node_id: NodeId,
        payload: serde_json::Value,
    },
    /// Session description answer, relayed opaquely to the opposite role
    Answer {
        node_id: NodeId,
        payload: serde_json::Value,
    },
    /// Transport candidate, relayed opaquely to the opposite role
    Ice {
        node_id: NodeId,
        payload: serde_json::Value,
    },
    /// Publisher liveness beacon, fanned out to all bound viewers
    Heartbeat {
        node_id: NodeId,
        payload: serde_json::Value,
    },
    /// Keepalive, answered with `pong` regardless of binding state
    Ping,
}

/// Message types sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Role binding succeeded
    Connected { role: BoundRole },
    /// Relayed session description offer
    Offer { payload: serde_json::Value },
    /// Relayed session description answer
    Answer { payload: serde_json::Value },
    /// Relayed transport candidate
    Ice { payload: serde_json::Value },
    /// Current viewer count for a node, sent to the publisher on every
    /// viewer bind/unbind
    ViewerCount { node_id: NodeId, count: u8 },
    /// Notifies the publisher that a viewer bound, carrying the viewer's
    /// token so the publisher can initiate negotiation
    Join { viewer_token: String },
    /// Publisher heartbeat fanned out to viewers, tagged with a
    /// server-assigned timestamp
    Heartbeat {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    /// The node was revoked; clients must tear down locally
    Revoke { node_id: NodeId },
    /// Keepalive response
    Pong { timestamp: DateTime<Utc> },
    /// Error message
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}

impl ServerMessage {
    /// Build an `error` frame from a code, using its canonical description.
    pub fn error(code: ErrorCode) -> Self {
        Self::Error {
            message: code.description().to_string(),
            error_code: Some(code),
        }
    }
}

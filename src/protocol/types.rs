use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default viewer capacity per node when not overridden by config.
pub const DEFAULT_MAX_VIEWERS: u8 = 3;
/// Default capability token lifetime in seconds (15 minutes).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 900;

/// Unique identifier for session nodes
pub type NodeId = Uuid;
/// Unique identifier for transport connections
pub type ConnectionId = Uuid;

/// Lifecycle status of a node. Transitions are monotonic: once a node is
/// revoked it never becomes active again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Active,
    Revoked,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// Role a connection holds once bound to a node.
///
/// A connection starts unbound; the first successful `publish` or `join`
/// fixes its role for the rest of its lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoundRole {
    /// The single connection allowed to originate offers and heartbeats.
    Publisher,
    /// A capacity-bounded receiving connection.
    Viewer,
}

impl fmt::Display for BoundRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publisher => write!(f, "publisher"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(
            serde_json::to_string(&NodeStatus::Revoked).unwrap(),
            "\"revoked\""
        );
    }

    #[test]
    fn bound_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BoundRole::Publisher).unwrap(),
            "\"publisher\""
        );
        assert_eq!(
            serde_json::to_string(&BoundRole::Viewer).unwrap(),
            "\"viewer\""
        );
    }
}

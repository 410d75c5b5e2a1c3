use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{NodeId, NodeStatus};

/// One session: a single publisher slot plus a bounded set of viewers.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub project_id: String,
    pub status: NodeStatus,
    pub viewer_count: u8,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("node not found")]
    NotFound,
    #[error("node has been revoked")]
    Revoked,
    #[error("viewer capacity reached (limit {limit})")]
    CapacityExceeded { limit: u8 },
}

/// Authoritative record of every node's identity, status, and viewer count.
///
/// All mutations for a node go through its `DashMap` entry, so increment,
/// decrement, and revoke are linearizable per node without a global lock.
pub(crate) struct NodeRegistry {
    nodes: DashMap<NodeId, Node>,
    max_viewers: u8,
}

impl NodeRegistry {
    pub fn new(max_viewers: u8) -> Self {
        Self {
            nodes: DashMap::new(),
            max_viewers,
        }
    }

    pub fn max_viewers(&self) -> u8 {
        self.max_viewers
    }

    /// Allocate a fresh node for a project. Starts active with zero viewers.
    pub fn create(&self, project_id: &str) -> Node {
        let node = Node {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            status: NodeStatus::Active,
            viewer_count: 0,
            created_at: Utc::now(),
        };
        self.nodes.insert(node.id, node.clone());
        node
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Node> {
        self.nodes.get(node_id).map(|entry| entry.clone())
    }

    /// Mark a node revoked. Idempotent: revoking an already-revoked node is
    /// a no-op success. The record is never removed within process lifetime.
    pub fn revoke(&self, node_id: &NodeId) -> Result<(), NodeError> {
        let mut node = self.nodes.get_mut(node_id).ok_or(NodeError::NotFound)?;
        node.status = NodeStatus::Revoked;
        Ok(())
    }

    /// Atomic check-and-increment of the viewer count. The entry guard is
    /// held across check and write, so concurrent callers cannot push the
    /// count past `max_viewers`.
    pub fn try_increment_viewer(&self, node_id: &NodeId) -> Result<u8, NodeError> {
        let mut node = self.nodes.get_mut(node_id).ok_or(NodeError::NotFound)?;
        if !node.is_active() {
            return Err(NodeError::Revoked);
        }
        if node.viewer_count >= self.max_viewers {
            return Err(NodeError::CapacityExceeded {
                limit: self.max_viewers,
            });
        }
        node.viewer_count += 1;
        Ok(node.viewer_count)
    }

    /// Decrement the viewer count, clamped at zero. Returns the new count,
    /// or `None` when the node is unknown. Each closing viewer connection
    /// calls this at most once by construction.
    pub fn decrement_viewer(&self, node_id: &NodeId) -> Option<u8> {
        let mut node = self.nodes.get_mut(node_id)?;
        node.viewer_count = node.viewer_count.saturating_sub(1);
        Some(node.viewer_count)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn create_and_get() {
        let registry = NodeRegistry::new(3);
        let node = registry.create("p1");

        let fetched = registry.get(&node.id).expect("node exists");
        assert_eq!(fetched.project_id, "p1");
        assert_eq!(fetched.status, NodeStatus::Active);
        assert_eq!(fetched.viewer_count, 0);
        assert!(registry.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn revoke_is_monotonic_and_idempotent() {
        let registry = NodeRegistry::new(3);
        let node = registry.create("p1");

        assert_eq!(registry.revoke(&node.id), Ok(()));
        assert_eq!(registry.revoke(&node.id), Ok(()));
        assert_eq!(
            registry.get(&node.id).map(|n| n.status),
            Some(NodeStatus::Revoked)
        );
        assert_eq!(registry.revoke(&Uuid::new_v4()), Err(NodeError::NotFound));
    }

    #[test]
    fn increment_enforces_capacity() {
        let registry = NodeRegistry::new(3);
        let node = registry.create("p1");

        assert_eq!(registry.try_increment_viewer(&node.id), Ok(1));
        assert_eq!(registry.try_increment_viewer(&node.id), Ok(2));
        assert_eq!(registry.try_increment_viewer(&node.id), Ok(3));
        assert_eq!(
            registry.try_increment_viewer(&node.id),
            Err(NodeError::CapacityExceeded { limit: 3 })
        );
        assert_eq!(registry.get(&node.id).map(|n| n.viewer_count), Some(3));
    }

    #[test]
    fn increment_rejects_revoked_and_unknown_nodes() {
        let registry = NodeRegistry::new(3);
        let node = registry.create("p1");
        registry.revoke(&node.id).expect("revoke");

        assert_eq!(
            registry.try_increment_viewer(&node.id),
            Err(NodeError::Revoked)
        );
        assert_eq!(
            registry.try_increment_viewer(&Uuid::new_v4()),
            Err(NodeError::NotFound)
        );
    }

    #[test]
    fn decrement_clamps_at_zero() {
        let registry = NodeRegistry::new(3);
        let node = registry.create("p1");

        registry.try_increment_viewer(&node.id).expect("increment");
        assert_eq!(registry.decrement_viewer(&node.id), Some(0));
        assert_eq!(registry.decrement_viewer(&node.id), Some(0));
        assert_eq!(registry.decrement_viewer(&Uuid::new_v4()), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_increments_never_exceed_capacity() {
        let registry = Arc::new(NodeRegistry::new(3));
        let node = registry.create("p1");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let node_id = node.id;
            handles.push(tokio::spawn(async move {
                registry.try_increment_viewer(&node_id).is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("task") {
                successes += 1;
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(registry.get(&node.id).map(|n| n.viewer_count), Some(3));
    }
}

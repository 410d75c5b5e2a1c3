//! HTTP session API: the synchronous request/response surface for node
//! lifecycle (create, mint viewer token, revoke, status).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::protocol::{ErrorCode, NodeId, NodeStatus};
use crate::server::{Node, NodeError, RelayServer, SessionError};

#[derive(Debug, Deserialize)]
pub(super) struct CreateNodeRequest {
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateNodeResponse {
    pub node_id: NodeId,
    pub owner_token: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ViewerTokenResponse {
    pub viewer_token: String,
}

#[derive(Debug, Serialize)]
pub(super) struct RevokeNodeResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct NodeStatusResponse {
    pub node_id: NodeId,
    pub project_id: String,
    pub status: NodeStatus,
    pub viewer_count: u8,
    pub created_at: DateTime<Utc>,
}

impl From<Node> for NodeStatusResponse {
    fn from(node: Node) -> Self {
        Self {
            node_id: node.id,
            project_id: node.project_id,
            status: node.status,
            viewer_count: node.viewer_count,
            created_at: node.created_at,
        }
    }
}

/// JSON error body mirroring the WebSocket `error` frame shape.
#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
    error_code: ErrorCode,
}

pub(super) struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            SessionError::Node(NodeError::NotFound) => {
                (StatusCode::NOT_FOUND, ErrorCode::NodeNotFound)
            }
            SessionError::Node(NodeError::Revoked) => (StatusCode::GONE, ErrorCode::NodeRevoked),
            SessionError::Node(NodeError::CapacityExceeded { .. }) => {
                (StatusCode::CONFLICT, ErrorCode::CapacityExceeded)
            }
            SessionError::Token(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError)
            }
        };
        let body = ApiErrorBody {
            error: self.0.to_string(),
            error_code: code,
        };
        (status, Json(body)).into_response()
    }
}

/// `POST /v1/nodes` — create a node and mint its owner token.
pub(super) async fn create_node(
    State(server): State<Arc<RelayServer>>,
    Json(request): Json<CreateNodeRequest>,
) -> Result<(StatusCode, Json<CreateNodeResponse>), ApiError> {
    let (node, owner_token) = server.create_node(&request.project_id)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateNodeResponse {
            node_id: node.id,
            owner_token,
        }),
    ))
}

/// `POST /v1/nodes/{node_id}/viewer-token` — mint a viewer token. The
/// capacity check here is advisory; binding re-checks authoritatively.
pub(super) async fn mint_viewer_token(
    State(server): State<Arc<RelayServer>>,
    Path(node_id): Path<NodeId>,
) -> Result<Json<ViewerTokenResponse>, ApiError> {
    let viewer_token = server.mint_viewer_token(&node_id)?;
    Ok(Json(ViewerTokenResponse { viewer_token }))
}

/// `DELETE /v1/nodes/{node_id}` — revoke a node and notify bound
/// connections. Idempotent.
pub(super) async fn revoke_node(
    State(server): State<Arc<RelayServer>>,
    Path(node_id): Path<NodeId>,
) -> Result<Json<RevokeNodeResponse>, ApiError> {
    server.revoke_node(&node_id).await?;
    Ok(Json(RevokeNodeResponse { revoked: true }))
}

/// `GET /v1/nodes/{node_id}` — diagnostic node snapshot.
pub(super) async fn node_status(
    State(server): State<Arc<RelayServer>>,
    Path(node_id): Path<NodeId>,
) -> Result<Json<NodeStatusResponse>, ApiError> {
    let node = server
        .node_status(&node_id)
        .ok_or(SessionError::Node(NodeError::NotFound))?;
    Ok(Json(node.into()))
}

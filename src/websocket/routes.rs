use crate::server::RelayServer;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use std::sync::Arc;

use super::api;
use super::handler::websocket_handler;

/// Create the Axum router with WebSocket support and the session API
pub fn create_router(cors_origins: &str) -> axum::Router<Arc<RelayServer>> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    // Parse CORS origins
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    axum::Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/v1/metrics", get(metrics_handler))
        .route("/v1/nodes", post(api::create_node))
        .route(
            "/v1/nodes/{node_id}",
            get(api::node_status).delete(api::revoke_node),
        )
        .route(
            "/v1/nodes/{node_id}/viewer-token",
            post(api::mint_viewer_token),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Metrics endpoint - returns the counter snapshot as JSON
async fn metrics_handler(State(server): State<Arc<RelayServer>>) -> Json<serde_json::Value> {
    let snapshot = server.metrics().snapshot();
    Json(serde_json::json!({
        "metrics": snapshot,
        "nodes": server.node_count(),
        "connections": server.connection_count(),
    }))
}

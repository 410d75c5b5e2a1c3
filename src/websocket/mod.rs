// WebSocket module - transport plumbing plus the HTTP session API
//
// - handler: WebSocket upgrade handler (entry point)
// - connection: socket pump for one connection
// - api: HTTP session API handlers (create, mint, revoke, status)
// - routes: HTTP route setup (ws, health, metrics, session API)

mod api;
mod connection;
mod handler;
mod routes;

pub use handler::websocket_handler;
pub use routes::create_router;

// Protocol module: wire message types, error codes, and shared identifiers

pub mod error_codes;
pub mod messages;
pub mod types;

pub use error_codes::ErrorCode;
pub use messages::{ClientMessage, ServerMessage};
pub use types::{
    BoundRole, ConnectionId, NodeId, NodeStatus, DEFAULT_MAX_VIEWERS, DEFAULT_TOKEN_TTL_SECS,
};

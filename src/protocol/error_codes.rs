use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for structured error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Token errors
    InvalidToken,

    // Node errors
    NodeNotFound,
    NodeRevoked,
    CapacityExceeded,

    // Binding errors
    RoleConflict,
    NotRegistered,
    RoleNotAllowed,

    // Transport errors
    MalformedMessage,
    MessageTooLarge,
    TooManyConnections,

    // Server errors
    InternalError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// These messages are sent verbatim in `error` frames so client SDKs can
    /// surface them directly.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidToken => {
                "The capability token is invalid, expired, or does not grant the requested role."
            }
            Self::NodeNotFound => {
                "The requested node could not be found. It may never have existed on this instance."
            }
            Self::NodeRevoked => {
                "The node has been revoked. No further tokens or bindings are possible."
            }
            Self::CapacityExceeded => {
                "The node has reached its maximum viewer capacity."
            }
            Self::RoleConflict => {
                "The requested role is already taken. A connection binds at most once, and a node has a single publisher."
            }
            Self::NotRegistered => {
                "This connection is not bound to a node. Send publish or join before relaying signals."
            }
            Self::RoleNotAllowed => {
                "The bound role is not permitted to send this message kind."
            }
            Self::MalformedMessage => {
                "The message could not be parsed. Check the frame against the protocol schema."
            }
            Self::MessageTooLarge => {
                "The message size exceeds the maximum allowed limit. Please send a smaller message."
            }
            Self::TooManyConnections => {
                "Too many active connections from this address. Close some connections before opening new ones."
            }
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # Peercast Relay
//!
//! A lightweight, in-memory WebSocket signaling relay that brokers
//! capability-scoped publisher/viewer sessions ("nodes").
//!
//! Zero external dependencies at runtime: no database, no cloud services.
//! Just run the binary and connect via WebSocket.

/// Capability token issuance and verification
pub mod auth;

/// Server configuration and environment variables
pub mod config;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// WebSocket message protocol definitions
pub mod protocol;

/// Main relay orchestration
pub mod server;

/// WebSocket connection handling and HTTP surface
pub mod websocket;

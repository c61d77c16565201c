//! TLS-terminating WebSocket gateway that authenticates clients and bridges
//! each session to a downstream TCP endpoint.
//!
//! ## Modules
//!
//! - [`config`]    — CLI/environment configuration surface
//! - [`error`]     — startup-time error taxonomy
//! - [`tls`]       — TLS context construction
//! - [`tokens`]    — the shared authorized-token set
//! - [`protocol`]  — service message codec
//! - [`transport`] — WebSocket framing adapter
//! - [`session`]   — the per-connection handshake state machine
//! - [`relay`]     — the bidirectional byte-pump engine
//! - [`state`]     — the gateway supervisor and its axum router

pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod state;
pub mod tls;
pub mod tokens;
pub mod transport;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use state::Supervisor;

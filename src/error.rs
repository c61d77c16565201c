//! Startup-time error taxonomy.
//!
//! These errors cover configuration and TLS bootstrap failures that abort
//! `main` before any session is ever accepted. They are distinct from the
//! wire-level error *codes* in [`crate::protocol::ErrorCode`], which are
//! part of the client-facing protocol and never constructed from this type.

use std::path::PathBuf;

/// Errors that can prevent the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A TLS certificate, key, or CA bundle file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadPem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM file was read but did not contain a certificate/key/CA in the
    /// expected format.
    #[error("{path} does not contain a valid {kind}")]
    InvalidPem { path: PathBuf, kind: &'static str },

    /// `--tls-cert`/`--tls-key` were only partially supplied.
    #[error("TLS requires both --tls-cert and --tls-key to be set")]
    IncompleteTlsConfig,

    /// rustls rejected the supplied certificate/key/verifier combination.
    #[error("failed to build TLS server config: {0}")]
    TlsConfig(#[from] rustls::Error),

    /// The client-certificate verifier could not be built from the
    /// configured CA bundle.
    #[error("failed to build client certificate verifier from {path}: {source}")]
    ClientVerifier {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The configured listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The process-wide rustls crypto provider could not be installed.
    #[error("failed to install rustls crypto provider")]
    CryptoProvider,
}

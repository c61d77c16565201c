//! Configuration types and CLI/environment parsing for the gateway.
//!
//! Mirrors the process-level configuration surface: every field can be set
//! from the command line or, equally, from an environment variable, so the
//! gateway can be driven from a unit file without a wrapper script.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default cap on the size of a single WebSocket message, in bytes (10 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default cap on a single HTTP request-line/header line, in bytes (64 KiB).
///
/// Raised from typical HTTP server defaults (usually ~8 KiB) because clients
/// may present large certificate-derived headers during TLS client auth.
pub const DEFAULT_MAX_HEADER_LINE_BYTES: usize = 64 * 1024;

/// Advisory WebSocket keepalive settings (§4.1). Absence of support in the
/// underlying transport must not break correctness.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
            close_timeout: Duration::from_secs(10),
        }
    }
}

/// The gateway's full command-line / environment configuration surface.
///
/// Can be constructed with [`GatewayConfig::parse`] in `main`, or built
/// directly (e.g. from tests) by constructing the struct literal.
#[derive(Parser, Debug, Clone)]
#[command(name = "connection-gateway", version, about)]
pub struct GatewayConfig {
    /// Address to listen on.
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// PEM certificate chain. Enables TLS when set together with `tls_key`.
    #[arg(long, env = "GATEWAY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key matching `tls_cert`.
    #[arg(long, env = "GATEWAY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// PEM CA bundle. When set, client certificates are required and must
    /// chain to one of these CAs.
    #[arg(long, env = "GATEWAY_TLS_CLIENT_CA")]
    pub tls_client_ca: Option<PathBuf>,

    /// A long-lived token accepted on every session; never consumed.
    #[arg(long, env = "GATEWAY_PERMANENT_AUTH_TOKEN")]
    pub permanent_auth_token: Option<String>,

    /// Skip token validation entirely; the hello frame advertises
    /// `auth_required: false`.
    #[arg(long, env = "GATEWAY_DISABLE_AUTH", default_value_t = false)]
    pub disable_auth: bool,

    /// Maximum size, in bytes, of a single WebSocket message.
    #[arg(long, env = "GATEWAY_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Maximum size, in bytes, of a single HTTP request-line/header line.
    #[arg(long, env = "GATEWAY_MAX_HEADER_LINE_BYTES", default_value_t = DEFAULT_MAX_HEADER_LINE_BYTES)]
    pub max_header_line_bytes: usize,

    #[command(skip)]
    pub keepalive: KeepAliveArg,
}

/// Wrapper so `KeepAlive` (not itself `clap`-derivable) can live on
/// [`GatewayConfig`] with a sensible default via `#[command(skip)]`.
#[derive(Debug, Clone, Copy)]
pub struct KeepAliveArg(pub KeepAlive);

impl Default for KeepAliveArg {
    fn default() -> Self {
        Self(KeepAlive::default())
    }
}

impl GatewayConfig {
    /// Whether TLS should be enabled for this configuration.
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() || self.tls_key.is_some()
    }

    /// The socket address to bind, combining `host` and `port`.
    pub fn listen_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.host, self.port)
    }
}

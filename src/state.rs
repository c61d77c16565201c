//! Gateway Supervisor (§4.5): the piece of shared state every accepted
//! connection is handed, and the axum entry point that turns an HTTP
//! upgrade into a running [`Session`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Router;
use tracing::info;

use crate::config::GatewayConfig;
use crate::session::Session;
use crate::tokens::TokenStore;
use crate::transport::{Transport, TransportLimits};

/// Shared, `Arc`-wrapped gateway state, cloned into every request handler
/// the way the teacher's `AppState` is — here there is exactly one
/// registry (`tokens`) instead of three, because the spec has no agent
/// registry or tunnel-session table to track (§9, "reach into relay
/// internals" is a Non-goal).
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    disable_auth: bool,
    limits: TransportLimits,
    tokens: TokenStore,
}

impl Supervisor {
    pub fn new(config: &GatewayConfig) -> Self {
        let tokens = TokenStore::new(
            Vec::<String>::new(),
            config.permanent_auth_token.clone(),
        );
        Self {
            inner: Arc::new(SupervisorInner {
                disable_auth: config.disable_auth,
                limits: TransportLimits::from(config),
                tokens,
            }),
        }
    }

    /// The out-of-band token mutation handle (§4.5/§6): provisioning
    /// systems call this to hand out a fresh one-time token.
    pub fn issue_one_time_token(&self, token: impl Into<String>) {
        self.inner.tokens.insert(token);
    }

    /// The axum `Router` serving the WebSocket upgrade endpoint. Per §4.1
    /// ("Accept any request path"), every path upgrades the same way — the
    /// gateway doesn't route on path, so a bare fallback handler covers the
    /// whole space instead of enumerating routes.
    pub fn router(self) -> Router {
        Router::new().fallback(ws_handler).with_state(self)
    }
}

/// The gateway's single entry point: every client connects here and is
/// upgraded to a WebSocket, regardless of what it eventually asks to
/// reach (§4.1).
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(supervisor): State<Supervisor>,
) -> impl IntoResponse {
    let limits = supervisor.inner.limits;
    ws.max_message_size(limits.max_message_size)
        .on_upgrade(move |socket| async move {
            info!(peer = %peer, "accepted");
            let transport = Transport::new(socket, limits.keepalive);
            let session = Session::new(peer);
            session
                .run(transport, supervisor.inner.disable_auth, &supervisor.inner.tokens)
                .await;
        })
}

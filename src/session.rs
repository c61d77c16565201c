//! Session State Machine (§4.3): drives one accepted connection through
//! Greeting → AwaitingHello → AwaitingConnect → Dialing → Relaying → Closed.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::protocol::{
    discriminator, parse_connect, parse_hello, recv_service_message, send_service_message,
    ErrorCode, HandshakeError, ServerMessage,
};
use crate::tokens::{TokenOutcome, TokenStore};
use crate::transport::Transport;

/// The session's position in the handshake, tracked explicitly so I3
/// ("the Session reaches Closed exactly once") is a property of one field
/// rather than implicit in control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Greeting,
    AwaitingHello,
    AwaitingConnect,
    Dialing,
    Relaying,
    Closed,
}

/// One client connection's lifecycle on the server side.
pub struct Session {
    pub peer_address: SocketAddr,
    state: SessionState,
    target_host: Option<String>,
    target_port: Option<u16>,
}

impl Session {
    pub fn new(peer_address: SocketAddr) -> Self {
        Self {
            peer_address,
            state: SessionState::Greeting,
            target_host: None,
            target_port: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the handshake and, on success, the relay, to completion. Never
    /// returns before the session has either failed the handshake or both
    /// relay directions have closed — there is no `wait()`-as-no-op
    /// shortcut here (see SPEC_FULL §9, "`wait()` on base sessions").
    pub async fn run(mut self, mut transport: Transport, disable_auth: bool, tokens: &TokenStore) {
        match self.handshake(&mut transport, disable_auth, tokens).await {
            Ok(Some(tcp)) => {
                self.state = SessionState::Relaying;
                info!(
                    peer = %self.peer_address,
                    host = %self.target_host.as_deref().unwrap_or(""),
                    port = self.target_port.unwrap_or(0),
                    "relaying"
                );
                crate::relay::run(transport, tcp, self.peer_address).await;
            }
            Ok(None) => {
                // A fatal() frame was already sent; close the socket behind it.
                transport.close().await;
            }
            Err(HandshakeError::PeerGone) => {
                info!(peer = %self.peer_address, "peer gone during handshake");
            }
        }
        self.state = SessionState::Closed;
    }

    /// Returns `Ok(Some(tcp))` on a successful dial, `Ok(None)` after a
    /// fatal error frame has been sent, or `Err(PeerGone)` if the peer
    /// disappeared before an expected reply. A reply we fail to *send* is
    /// never folded into `PeerGone` — `PeerGone` means `recv` observed a
    /// close frame; a send failure with no such evidence is reported as
    /// `handshake-error`, same as any other unexpected handshake failure.
    async fn handshake(
        &mut self,
        transport: &mut Transport,
        disable_auth: bool,
        tokens: &TokenStore,
    ) -> Result<Option<TcpStream>, HandshakeError> {
        self.state = SessionState::Greeting;
        if let Err(e) = send_service_message(transport, &ServerMessage::hello(!disable_auth)).await
        {
            return self
                .fatal(transport, ErrorCode::HandshakeError, Some(e.to_string()))
                .await;
        }

        self.state = SessionState::AwaitingHello;
        let hello = match recv_service_message(transport).await {
            Ok(value) => value,
            Err(HandshakeError::PeerGone) => return Err(HandshakeError::PeerGone),
            Err(HandshakeError::Fatal(code, details)) => {
                return self.fatal(transport, code, details).await
            }
        };
        if discriminator(&hello) != Some("hello") {
            return self.fatal(transport, ErrorCode::ExpectedHello, None).await;
        }

        if !disable_auth {
            let parsed = parse_hello(&hello);
            let Some(auth_token) = parsed.auth_token else {
                return self
                    .fatal(transport, ErrorCode::ExpectedAuthToken, None)
                    .await;
            };
            match tokens.validate_and_consume(&auth_token) {
                TokenOutcome::Permanent | TokenOutcome::OneTime => {}
                TokenOutcome::Rejected => {
                    return self
                        .fatal(transport, ErrorCode::IncorrectAuthToken, None)
                        .await;
                }
            }
        }

        if let Err(e) = send_service_message(transport, &ServerMessage::Ready).await {
            return self
                .fatal(transport, ErrorCode::HandshakeError, Some(e.to_string()))
                .await;
        }

        self.state = SessionState::AwaitingConnect;
        let connect = match recv_service_message(transport).await {
            Ok(value) => value,
            Err(HandshakeError::PeerGone) => return Err(HandshakeError::PeerGone),
            Err(HandshakeError::Fatal(code, details)) => {
                return self.fatal(transport, code, details).await
            }
        };
        if discriminator(&connect) != Some("connect") {
            return self
                .fatal(transport, ErrorCode::ExpectedConnect, None)
                .await;
        }
        let Some(request) = parse_connect(&connect) else {
            return self
                .fatal(
                    transport,
                    ErrorCode::InvalidMessage,
                    Some("connect requires string host and integer port".to_string()),
                )
                .await;
        };
        self.target_host = Some(request.host.clone());
        self.target_port = Some(request.port);

        self.state = SessionState::Dialing;
        let tcp = match TcpStream::connect((request.host.as_str(), request.port)).await {
            Ok(tcp) => tcp,
            Err(e) => {
                return self
                    .fatal(transport, ErrorCode::ConnectionFailed, Some(e.to_string()))
                    .await;
            }
        };

        if let Err(e) = send_service_message(transport, &ServerMessage::Connected).await {
            return self
                .fatal(transport, ErrorCode::HandshakeError, Some(e.to_string()))
                .await;
        }

        Ok(Some(tcp))
    }

    /// Sends the fatal error frame. The caller (`run`) closes the
    /// transport immediately afterward, satisfying "`fatal` must send the
    /// error frame and then close the WebSocket; callers must not proceed
    /// after invoking it" without needing to consume `transport` here.
    ///
    /// Log level follows the original's split between routine,
    /// client-triggerable rejections (`self.log.info(...)` for a failed
    /// dial, no log at all for a bad discriminator) and genuinely
    /// unexpected failures (`self.log.error(...)` for invalid JSON and the
    /// catch-all handshake exception) — only the latter warrants `error!`
    /// here.
    async fn fatal(
        &mut self,
        transport: &mut Transport,
        code: ErrorCode,
        details: Option<String>,
    ) -> Result<Option<TcpStream>, HandshakeError> {
        match code {
            ErrorCode::HandshakeError => {
                error!(peer = %self.peer_address, ?code, details = ?details, "unexpected error during handshake");
            }
            ErrorCode::InvalidMessage => {
                error!(peer = %self.peer_address, ?code, details = ?details, "malformed message during handshake");
            }
            ErrorCode::IncorrectAuthToken => {
                warn!(peer = %self.peer_address, ?code, "auth token rejected");
            }
            ErrorCode::ExpectedHello
            | ErrorCode::ExpectedAuthToken
            | ErrorCode::ExpectedConnect
            | ErrorCode::ConnectionFailed => {
                info!(peer = %self.peer_address, ?code, details = ?details, "fatal");
            }
        }
        let _ = send_service_message(transport, &ServerMessage::error(code, details)).await;
        Ok(None)
    }
}

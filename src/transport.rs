//! Transport Adapter (§4.1): exposes an accepted WebSocket as a duplex of
//! framed messages, with the size/keepalive knobs collected in one place.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::time::{Instant, Interval};

use crate::config::{GatewayConfig, KeepAlive};

/// A single inbound WebSocket frame, classified the way the Service
/// Message Codec (§4.2) needs: text during the handshake, binary during
/// relay.
#[derive(Debug)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Wraps an accepted [`WebSocket`] for the handshake phase, where frames
/// are received and sent one at a time, sequentially.
///
/// During the handshake the socket is used whole; once the session enters
/// `Relaying`, [`Transport::into_split`] hands ownership of the sink/stream
/// halves to the two independent relay pumps (§4.4), mirroring how the
/// teacher splits its socket in `handlers.rs`.
///
/// The original `websockets` server applies its `ping_interval`/
/// `ping_timeout`/`close_timeout` for the whole connection lifetime (it's a
/// library-level keepalive). Here the same advisory ping/pong loop is run
/// only across `recv()` — i.e. during the handshake, while the socket is
/// still a single `Transport` awaiting one reply at a time — because the
/// relay phase has its own, spec-mandated liveness check (the TCP read
/// timeout in `relay.rs`, §5), and splitting the socket into independently
/// owned pump halves leaves no single owner left to drive a ping loop
/// without a shared-mutex indirection the spec doesn't call for.
pub struct Transport {
    socket: WebSocket,
    keepalive: KeepAlive,
    ping_interval: Interval,
    awaiting_pong_since: Option<Instant>,
}

impl Transport {
    pub fn new(socket: WebSocket, keepalive: KeepAlive) -> Self {
        let mut ping_interval = tokio::time::interval(keepalive.ping_interval);
        // `tokio::time::interval`'s first `tick()` completes immediately;
        // without this the `select!` in `recv()` would send a spurious
        // ping at t≈0 instead of after a full `ping_interval`.
        ping_interval.reset_after(keepalive.ping_interval);
        Self {
            socket,
            ping_interval,
            keepalive,
            awaiting_pong_since: None,
        }
    }

    /// Receives the next frame. `Ok(None)` means the peer closed the
    /// connection, or went quiet past `ping_timeout` after an
    /// unanswered keepalive ping; text and binary frames are classified,
    /// everything else (ping/pong/close control frames) is handled
    /// internally until a data frame, a close, or a dead-peer timeout
    /// arrives.
    pub async fn recv(&mut self) -> Result<Option<Frame>, axum::Error> {
        loop {
            tokio::select! {
                biased;
                frame = self.socket.recv() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text.to_string()))),
                        Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data.into()))),
                        Some(Ok(Message::Close(_))) => return Ok(None),
                        Some(Ok(Message::Pong(_))) => {
                            self.awaiting_pong_since = None;
                            continue;
                        }
                        Some(Ok(Message::Ping(_))) => continue,
                        Some(Err(e)) => return Err(e),
                        None => return Ok(None),
                    }
                }
                _ = self.ping_interval.tick() => {
                    if let Some(since) = self.awaiting_pong_since {
                        if since.elapsed() >= self.keepalive.ping_timeout {
                            return Ok(None);
                        }
                        continue;
                    }
                    if self
                        .socket
                        .send(Message::Ping(Vec::<u8>::new().into()))
                        .await
                        .is_err()
                    {
                        return Ok(None);
                    }
                    self.awaiting_pong_since = Some(Instant::now());
                }
            }
        }
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.socket.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), axum::Error> {
        self.socket.send(Message::Binary(data.into())).await
    }

    /// Best-effort close: send a close frame, ignoring errors (the peer may
    /// already be gone), bounded by the advisory `close_timeout` so a peer
    /// that never acknowledges the close frame can't hold the session open
    /// indefinitely.
    pub async fn close(mut self) {
        let _ = tokio::time::timeout(
            self.keepalive.close_timeout,
            self.socket.send(Message::Close(None)),
        )
        .await;
    }

    /// Hands off to the relay phase: splits into independently-owned
    /// sink/stream halves, one per pump.
    pub fn into_split(self) -> (WsSink, WsStream) {
        self.socket.split()
    }
}

pub type WsSink = SplitSink<WebSocket, Message>;
pub type WsStream = SplitStream<WebSocket>;

/// The server-side knobs applied when accepting a WebSocket upgrade:
/// message size limit and advisory keepalive. Kept as one struct so
/// `ws_handler` has a single place to read them from the running config.
#[derive(Debug, Clone, Copy)]
pub struct TransportLimits {
    pub max_message_size: usize,
    pub keepalive: KeepAlive,
}

impl From<&GatewayConfig> for TransportLimits {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            keepalive: config.keepalive.0,
        }
    }
}

//! Service Message Codec (§4.2) and wire vocabulary (§6).
//!
//! Control frames are UTF-8 JSON objects with a `"_"` discriminator field,
//! sent as WebSocket text messages. Client frames are first decoded into a
//! generic [`serde_json::Value`] so an unrecognized discriminator can be
//! turned into its own protocol error (`expected-hello`/`expected-connect`)
//! rather than a generic parse failure — mirroring the original's
//! `msg.get('_')` check-then-branch instead of a strict tagged enum on the
//! receive side.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::transport::{Frame, Transport};

/// The protocol version this gateway speaks. Clients SHOULD refuse unknown
/// versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Fatal error codes (§6), exhaustive for the core protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    ExpectedHello,
    ExpectedAuthToken,
    IncorrectAuthToken,
    ExpectedConnect,
    InvalidMessage,
    ConnectionFailed,
    HandshakeError,
}

/// Server → client control frames (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "_", rename_all = "snake_case")]
pub enum ServerMessage {
    Hello {
        version: u32,
        auth_required: bool,
    },
    Ready,
    Connected,
    Error {
        code: ErrorCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ServerMessage {
    pub fn hello(auth_required: bool) -> Self {
        ServerMessage::Hello {
            version: PROTOCOL_VERSION,
            auth_required,
        }
    }

    pub fn error(code: ErrorCode, details: Option<String>) -> Self {
        ServerMessage::Error { code, details }
    }
}

/// The outcome of a handshake step that failed to produce the expected
/// message, distinguishing a peer that is simply gone (§4.3 tie-break:
/// "not fatal-with-report") from an actual protocol violation.
#[derive(Debug)]
pub enum HandshakeError {
    /// The WebSocket closed (or errored, which is treated the same way for
    /// handshake purposes — see §7 "Transport error") before the expected
    /// reply arrived. No error frame is sent.
    PeerGone,
    /// A protocol violation that must be reported with `fatal(code, ...)`.
    Fatal(ErrorCode, Option<String>),
}

/// Reads one service message frame and parses it as a JSON object.
///
/// A WebSocket close (or any transport-level error, which by this point in
/// the handshake means the connection is unusable) yields
/// [`HandshakeError::PeerGone`]. Malformed JSON, a non-object payload, or a
/// binary frame during the handshake (control frames are always text per
/// §4.2) yields `invalid-message`.
pub async fn recv_service_message(transport: &mut Transport) -> Result<Value, HandshakeError> {
    let frame = match transport.recv().await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Err(HandshakeError::PeerGone),
        Err(e) => {
            info!(error = %e, "transport error awaiting service message");
            return Err(HandshakeError::PeerGone);
        }
    };

    let text = match frame {
        Frame::Text(text) => text,
        Frame::Binary(_) => {
            return Err(HandshakeError::Fatal(
                ErrorCode::InvalidMessage,
                Some("expected a text frame".to_string()),
            ))
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(HandshakeError::Fatal(
            ErrorCode::InvalidMessage,
            Some("expected a JSON object".to_string()),
        )),
        Err(e) => Err(HandshakeError::Fatal(
            ErrorCode::InvalidMessage,
            Some(format!("invalid JSON: {e}")),
        )),
    }
}

/// Serializes `message` and sends it as a WebSocket text frame.
pub async fn send_service_message(
    transport: &mut Transport,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message)
        .expect("ServerMessage serialization is infallible for these variants");
    transport.send_text(text).await
}

/// The `"_"` discriminator of a decoded service message, if present.
pub fn discriminator(value: &Value) -> Option<&str> {
    value.get("_").and_then(Value::as_str)
}

/// A parsed client `hello` frame (§6): `auth_token` is `None` when the
/// field is absent or empty, which is only valid when auth is disabled.
pub struct ClientHello {
    pub auth_token: Option<String>,
}

pub fn parse_hello(value: &Value) -> ClientHello {
    let auth_token = value
        .get("auth_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    ClientHello { auth_token }
}

/// A parsed client `connect` frame (§6).
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
}

/// Parses a `connect` frame; `None` if `host`/`port` are missing or
/// malformed (port out of `u16` range counts as malformed), which the
/// caller reports as `invalid-message`.
pub fn parse_connect(value: &Value) -> Option<ConnectRequest> {
    let host = value.get("host")?.as_str()?.to_string();
    let port = value.get("port")?.as_u64()?;
    let port: u16 = port.try_into().ok()?;
    Some(ConnectRequest { host, port })
}

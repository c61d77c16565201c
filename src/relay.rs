//! Relay Engine (§4.4): two concurrent unidirectional byte pumps bridging
//! the WebSocket and the downstream TCP socket, until either side closes.

use std::net::SocketAddr;

use axum::extract::ws::Message;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::transport::{Transport, WsSink, WsStream};

/// Read buffer used on the TCP→WS direction. Arbitrary size; bytes are
/// forwarded as soon as they're available rather than batched to a
/// delimiter (SPEC_FULL §9, "reach into relay internals").
const READ_BUF_SIZE: usize = 8192;

/// Runs the relay to completion: whichever pump observes closure first
/// wins, the other is dropped (cancelling its in-flight read/write), and a
/// best-effort drain of the TCP writer is attempted before both transports
/// are released.
pub async fn run(transport: Transport, tcp: TcpStream, peer: SocketAddr) {
    let (mut ws_sink, mut ws_stream) = transport.into_split();
    let (mut tcp_read, mut tcp_write) = tcp.into_split();

    {
        let ws_to_tcp = pump_ws_to_tcp(&mut ws_stream, &mut tcp_write);
        let tcp_to_ws = pump_tcp_to_ws(&mut tcp_read, &mut ws_sink);
        tokio::pin!(ws_to_tcp);
        tokio::pin!(tcp_to_ws);

        tokio::select! {
            _ = &mut ws_to_tcp => {}
            _ = &mut tcp_to_ws => {}
        }
    }

    info!(peer = %peer, "relay closed");

    // Best-effort drain of the TCP writer (§4.4, §9 "writer drain"): the
    // Python original calls `drain()` on an already-closing writer and
    // swallows reset errors; the tokio analogue is a flush immediately
    // followed by a half-close, with the same errors swallowed.
    match tcp_write.flush().await {
        Ok(()) => {}
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ) => {}
        Err(e) => debug!(peer = %peer, error = %e, "error draining tcp writer on close"),
    }
    let _ = tcp_write.shutdown().await;
    let _ = ws_sink.close().await;
}

/// WS → TCP: await a WebSocket frame; on receive, write its payload to the
/// TCP socket verbatim. Returns as soon as the WebSocket closes, a write
/// fails, or a close frame arrives.
async fn pump_ws_to_tcp(ws_stream: &mut WsStream, tcp_write: &mut OwnedWriteHalf) {
    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Binary(data))) => {
                if tcp_write.write_all(&data).await.is_err() {
                    return;
                }
            }
            Some(Ok(Message::Text(text))) => {
                // Handshake frames never reach the relay; any text frame
                // here is client data sent as text instead of binary, and
                // is forwarded verbatim rather than rejected.
                if tcp_write.write_all(text.as_bytes()).await.is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Err(_)) => return,
        }
    }
}

/// TCP → WS: await bytes from the TCP socket; on a non-empty read, send
/// them as a single binary WebSocket message. Returns on EOF, a read
/// error, or a send failure.
///
/// §5 ties dead-peer detection here to "the TCP socket's read timeout, if
/// the transport surfaces one". Tokio's async `TcpStream` has no such
/// built-in read timeout (unlike a blocking socket's `SO_RCVTIMEO`); the
/// transport genuinely does not surface one, so none is imposed here —
/// an arbitrary timeout would close tunnels that are legitimately idle
/// rather than dead. Dead peers are still caught: a closed/reset TCP peer
/// surfaces as `Ok(0)` or `Err` on the next read, same as always.
async fn pump_tcp_to_ws(tcp_read: &mut OwnedReadHalf, ws_sink: &mut WsSink) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        match tcp_read.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                if ws_sink
                    .send(Message::Binary(buf[..n].to_vec().into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

//! End-to-end scenarios from the handshake/relay specification, driven
//! against a real gateway bound to an ephemeral port.

use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};

use connection_gateway::config::{GatewayConfig, KeepAliveArg};
use connection_gateway::state::Supervisor;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite;

fn base_config() -> GatewayConfig {
    GatewayConfig {
        host: Ipv4Addr::UNSPECIFIED.into(),
        port: 0,
        tls_cert: None,
        tls_key: None,
        tls_client_ca: None,
        permanent_auth_token: None,
        disable_auth: false,
        max_message_size: connection_gateway::config::DEFAULT_MAX_MESSAGE_SIZE,
        max_header_line_bytes: connection_gateway::config::DEFAULT_MAX_HEADER_LINE_BYTES,
        keepalive: KeepAliveArg::default(),
    }
}

/// Spawns a supervisor on an ephemeral loopback port and returns its address.
async fn spawn_gateway(supervisor: Supervisor) -> SocketAddr {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let app = supervisor
        .router()
        .into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(axum::serve(listener, app).into_future());
    addr
}

/// Spawns a loopback TCP server that echoes whatever it reads back verbatim.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let (mut read, mut write) = stream.split();
            let _ = tokio::io::copy(&mut read, &mut write).await;
        }
    });
    addr
}

async fn connect(addr: SocketAddr) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<TcpStream>,
> {
    let (socket, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();
    socket
}

async fn recv_json(
    socket: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>,
) -> serde_json::Value {
    match socket.next().await.unwrap().unwrap() {
        tungstenite::Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text control frame, got {other:?}"),
    }
}

#[tokio::test]
async fn one_time_token_grants_a_session_and_relays_bytes() {
    let supervisor = Supervisor::new(&base_config());
    supervisor.issue_one_time_token("T1");
    let gateway_addr = spawn_gateway(supervisor).await;
    let echo_addr = spawn_echo_server().await;

    let mut socket = connect(gateway_addr).await;

    let hello = recv_json(&mut socket).await;
    assert_eq!(hello["_"], "hello");
    assert_eq!(hello["auth_required"], true);

    socket
        .send(tungstenite::Message::text(
            json!({"_": "hello", "auth_token": "T1"}).to_string(),
        ))
        .await
        .unwrap();
    let ready = recv_json(&mut socket).await;
    assert_eq!(ready["_"], "ready");

    socket
        .send(tungstenite::Message::text(
            json!({"_": "connect", "host": "127.0.0.1", "port": echo_addr.port()}).to_string(),
        ))
        .await
        .unwrap();
    let connected = recv_json(&mut socket).await;
    assert_eq!(connected["_"], "connected");

    socket
        .send(tungstenite::Message::Binary(b"hello downstream".to_vec().into()))
        .await
        .unwrap();
    match socket.next().await.unwrap().unwrap() {
        tungstenite::Message::Binary(data) => assert_eq!(&data[..], b"hello downstream"),
        other => panic!("expected a binary relay frame, got {other:?}"),
    }
}

#[tokio::test]
async fn permanent_token_is_reusable_across_sessions() {
    let mut config = base_config();
    config.permanent_auth_token = Some("FOREVER".to_string());
    let supervisor = Supervisor::new(&config);
    let gateway_addr = spawn_gateway(supervisor).await;
    let echo_addr = spawn_echo_server().await;

    for _ in 0..2 {
        let mut socket = connect(gateway_addr).await;
        let _hello = recv_json(&mut socket).await;
        socket
            .send(tungstenite::Message::text(
                json!({"_": "hello", "auth_token": "FOREVER"}).to_string(),
            ))
            .await
            .unwrap();
        let ready = recv_json(&mut socket).await;
        assert_eq!(ready["_"], "ready");

        socket
            .send(tungstenite::Message::text(
                json!({"_": "connect", "host": "127.0.0.1", "port": echo_addr.port()}).to_string(),
            ))
            .await
            .unwrap();
        let connected = recv_json(&mut socket).await;
        assert_eq!(connected["_"], "connected");
    }
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let supervisor = Supervisor::new(&base_config());
    supervisor.issue_one_time_token("T1");
    let gateway_addr = spawn_gateway(supervisor).await;

    let mut socket = connect(gateway_addr).await;
    let _hello = recv_json(&mut socket).await;
    socket
        .send(tungstenite::Message::text(
            json!({"_": "hello", "auth_token": "WRONG"}).to_string(),
        ))
        .await
        .unwrap();

    let error = recv_json(&mut socket).await;
    assert_eq!(error["_"], "error");
    assert_eq!(error["code"], "incorrect-auth-token");
}

#[tokio::test]
async fn wrong_discriminator_after_hello_is_rejected() {
    let supervisor = Supervisor::new(&base_config());
    let gateway_addr = spawn_gateway(supervisor).await;

    let mut socket = connect(gateway_addr).await;
    let _hello = recv_json(&mut socket).await;
    // Sending a `connect` frame where a `hello` is expected.
    socket
        .send(tungstenite::Message::text(
            json!({"_": "connect", "host": "127.0.0.1", "port": 1}).to_string(),
        ))
        .await
        .unwrap();

    let error = recv_json(&mut socket).await;
    assert_eq!(error["_"], "error");
    assert_eq!(error["code"], "expected-hello");
}

#[tokio::test]
async fn downstream_dial_failure_is_reported() {
    let mut config = base_config();
    config.disable_auth = true;
    let supervisor = Supervisor::new(&config);
    let gateway_addr = spawn_gateway(supervisor).await;

    // Nothing is listening on this port, so the connect should fail fast.
    let dead_listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .unwrap();
    let dead_addr = dead_listener.local_addr().unwrap();
    drop(dead_listener);

    let mut socket = connect(gateway_addr).await;
    let _hello = recv_json(&mut socket).await;
    socket
        .send(tungstenite::Message::text(
            json!({"_": "hello"}).to_string(),
        ))
        .await
        .unwrap();
    let ready = recv_json(&mut socket).await;
    assert_eq!(ready["_"], "ready");

    socket
        .send(tungstenite::Message::text(
            json!({"_": "connect", "host": "127.0.0.1", "port": dead_addr.port()}).to_string(),
        ))
        .await
        .unwrap();

    let error = recv_json(&mut socket).await;
    assert_eq!(error["_"], "error");
    assert_eq!(error["code"], "connection-failed");
}

#[tokio::test]
async fn disabled_auth_skips_token_validation() {
    let mut config = base_config();
    config.disable_auth = true;
    let supervisor = Supervisor::new(&config);
    let gateway_addr = spawn_gateway(supervisor).await;
    let echo_addr = spawn_echo_server().await;

    let mut socket = connect(gateway_addr).await;
    let hello = recv_json(&mut socket).await;
    assert_eq!(hello["auth_required"], false);

    socket
        .send(tungstenite::Message::text(
            json!({"_": "hello"}).to_string(),
        ))
        .await
        .unwrap();
    let ready = recv_json(&mut socket).await;
    assert_eq!(ready["_"], "ready");

    socket
        .send(tungstenite::Message::text(
            json!({"_": "connect", "host": "127.0.0.1", "port": echo_addr.port()}).to_string(),
        ))
        .await
        .unwrap();
    let connected = recv_json(&mut socket).await;
    assert_eq!(connected["_"], "connected");
}

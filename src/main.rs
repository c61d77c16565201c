//! Connection gateway entry point: parses configuration, builds the
//! optional TLS acceptor, and serves the WebSocket upgrade endpoint until
//! a shutdown signal arrives.

use axum_server::Handle;
use clap::Parser;
use tracing::{error, info};

use connection_gateway::{tls, GatewayConfig, Supervisor};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connection_gateway=info".into()),
        )
        .init();

    let config = GatewayConfig::parse();

    if let Err(e) = run(config).await {
        error!(error = %e, "gateway exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: GatewayConfig) -> Result<(), connection_gateway::GatewayError> {
    tls::install_crypto_provider()?;

    let tls_config = tls::build_server_config(&config)?;
    let addr = config.listen_addr();
    let app = Supervisor::new(&config)
        .router()
        .into_make_service_with_connect_info::<std::net::SocketAddr>();

    let handle = Handle::new();
    tokio::spawn(wait_for_shutdown_signal(handle.clone()));

    match tls_config {
        Some(tls_config) => {
            info!(%addr, tls = true, "listening");
            let mut server = axum_server::bind_rustls(
                addr,
                axum_server::tls_rustls::RustlsConfig::from_config(tls_config),
            );
            server
                .http_builder()
                .http1()
                .max_buf_size(config.max_header_line_bytes);
            server
                .handle(handle)
                .serve(app)
                .await
                .map_err(|source| connection_gateway::GatewayError::Bind { addr, source })?;
        }
        None => {
            info!(%addr, tls = false, "listening");
            let mut server = axum_server::bind(addr);
            server
                .http_builder()
                .http1()
                .max_buf_size(config.max_header_line_bytes);
            server
                .handle(handle)
                .serve(app)
                .await
                .map_err(|source| connection_gateway::GatewayError::Bind { addr, source })?;
        }
    }

    Ok(())
}

/// Waits for SIGINT or SIGTERM and triggers a graceful shutdown: accepted
/// sessions are given a grace period to finish their relay before the
/// process exits.
async fn wait_for_shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining active sessions");
    handle.graceful_shutdown(Some(std::time::Duration::from_secs(30)));
}

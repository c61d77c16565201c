//! TLS context construction (§4.5, §6 "TLS").
//!
//! The core only needs an `Arc<rustls::ServerConfig>` (or none, for a
//! plaintext listener) handed to `axum_server`. Building that config from
//! PEM files, including optional mutual-TLS against a configured CA
//! bundle, is this crate's job; *issuing* certificates is not (§1).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Installs the process-wide rustls crypto provider. Must be called
/// exactly once before any `ServerConfig` is built; `main` does this
/// ahead of everything else, the way
/// `other_examples/a504317b_ckir-rsdev`'s restream gateway does.
pub fn install_crypto_provider() -> Result<(), GatewayError> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| GatewayError::CryptoProvider)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, GatewayError> {
    std::fs::read(path).map_err(|source| GatewayError::ReadPem {
        path: path.to_path_buf(),
        source,
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, GatewayError> {
    let data = read_pem(path)?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut data.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|_| GatewayError::InvalidPem {
            path: path.to_path_buf(),
            kind: "certificate",
        })?;
    if certs.is_empty() {
        return Err(GatewayError::InvalidPem {
            path: path.to_path_buf(),
            kind: "certificate",
        });
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, GatewayError> {
    let data = read_pem(path)?;
    rustls_pemfile::private_key(&mut data.as_slice())
        .map_err(|_| GatewayError::InvalidPem {
            path: path.to_path_buf(),
            kind: "private key",
        })?
        .ok_or(GatewayError::InvalidPem {
            path: path.to_path_buf(),
            kind: "private key",
        })
}

/// Logs the subject line of every certificate in `certs`, the Rust
/// equivalent of the original's `ssl.get_ca_certs()` startup log.
fn log_ca_subjects(path: &PathBuf, certs: &[CertificateDer<'static>]) {
    info!(ca_bundle = %path.display(), count = certs.len(), "authorized CAs:");
    for cert in certs {
        match x509_parser::parse_x509_certificate(cert.as_ref()) {
            Ok((_, parsed)) => info!(" - {}", parsed.subject()),
            Err(e) => info!(" - <unparsable certificate: {e}>"),
        }
    }
}

/// Builds the rustls server config for `config`, or `None` if TLS is not
/// enabled. When `tls_client_ca` is set, client certificates signed by
/// that bundle are required; otherwise TLS is transport-only, matching
/// "client-cert fields are not inspected by the core" (§6).
pub fn build_server_config(config: &GatewayConfig) -> Result<Option<Arc<ServerConfig>>, GatewayError> {
    if !config.tls_enabled() {
        return Ok(None);
    }
    let cert_path = config
        .tls_cert
        .as_ref()
        .ok_or(GatewayError::IncompleteTlsConfig)?;
    let key_path = config
        .tls_key
        .as_ref()
        .ok_or(GatewayError::IncompleteTlsConfig)?;

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let server_config = match &config.tls_client_ca {
        Some(ca_path) => {
            let ca_certs = load_certs(ca_path)?;
            log_ca_subjects(ca_path, &ca_certs);

            let mut roots = RootCertStore::empty();
            for cert in ca_certs {
                roots
                    .add(cert)
                    .map_err(GatewayError::TlsConfig)?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|source| GatewayError::ClientVerifier {
                    path: ca_path.clone(),
                    source: Box::new(source),
                })?;

            ServerConfig::builder()
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
                .map_err(GatewayError::TlsConfig)?
        }
        None => ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(GatewayError::TlsConfig)?,
    };

    Ok(Some(Arc::new(server_config)))
}

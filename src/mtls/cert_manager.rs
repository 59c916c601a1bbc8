//! Certificate management: PEM loading and rustls config building.
//!
//! Provides:
//! - [`build_tls_config`] - build a `rustls::ServerConfig` that demands a
//!   client certificate issued by the tenant CA
//! - [`load_certs`] / [`load_private_key`] / [`load_crls`] - PEM file loading
//!
//! # File format
//!
//! All certificate, key and CRL files are expected in **PEM format**.

use std::fs;
use std::sync::Arc;

use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tracing::debug;

use crate::config::Config;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Public: build TLS server config
// ─────────────────────────────────────────────────────────────────────────────

/// Build a `rustls::ServerConfig` for mutual TLS from the ambassador config.
///
/// Clients without a valid certificate signed by `tenant_ca_pem` are rejected
/// during the handshake. When `crl_pem` is set, revoked client certificates
/// are rejected as well.
///
/// # Errors
///
/// Returns an error if any certificate, key or CRL file cannot be read or
/// parsed, or if the server certificate and key do not belong together.
pub fn build_tls_config(config: &Config) -> Result<ServerConfig> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    let server_certs = load_certs(&config.server_cert)?;
    let server_key = load_private_key(&config.server_key)?;
    let ca_certs = load_certs(&config.tenant_ca_pem)?;

    let mut root_store = RootCertStore::empty();
    for cert in ca_certs {
        root_store
            .add(cert)
            .map_err(|e| Error::Tls(format!("Failed to add tenant CA to trust store: {e}")))?;
    }

    let client_verifier = build_client_verifier(config, root_store, Arc::clone(&provider))?;

    let mut tls_cfg = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported TLS protocol versions: {e}")))?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Tls(format!("TLS config error (cert/key mismatch?): {e}")))?;

    // Prefer HTTP/2, fall back to HTTP/1.1
    tls_cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        tenant_ca = %config.tenant_ca_pem,
        crl = config.crl_pem.as_deref().unwrap_or("none"),
        "mTLS config built"
    );

    Ok(tls_cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Public: PEM loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no valid PEM
/// certificate blocks.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let pem_data = read_file(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem_data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certs from '{path}': {e}")))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!("No certificates found in '{path}'")));
    }

    Ok(certs)
}

/// Load the first private key from a PEM file.
///
/// Supports PKCS#1 (`RSA PRIVATE KEY`), PKCS#8 (`PRIVATE KEY`) and SEC1
/// (`EC PRIVATE KEY`).
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no private key.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let pem_data = read_file(path)?;
    let key = rustls_pemfile::private_key(&mut pem_data.as_slice())
        .map_err(|e| Error::Tls(format!("Failed to parse private key from '{path}': {e}")))?
        .ok_or_else(|| Error::Tls(format!("No private key found in '{path}'")))?;

    Ok(key)
}

/// Load CRL entries from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds no `X509 CRL` block.
pub fn load_crls(path: &str) -> Result<Vec<CertificateRevocationListDer<'static>>> {
    let pem_data = read_file(path)?;
    let crls: Vec<CertificateRevocationListDer<'static>> =
        rustls_pemfile::crls(&mut pem_data.as_slice())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Tls(format!("Failed to parse CRL from '{path}': {e}")))?;

    if crls.is_empty() {
        return Err(Error::Tls(format!("No CRL found in '{path}'")));
    }

    Ok(crls)
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_file(path: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Tls(format!("Cannot read '{path}': {e}")))
}

/// Build a `WebPkiClientVerifier` that requires a client certificate.
fn build_client_verifier(
    config: &Config,
    root_store: RootCertStore,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<dyn rustls::server::danger::ClientCertVerifier>> {
    let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(root_store), provider);

    let builder = match config.crl_pem {
        Some(ref crl_path) => builder.with_crls(load_crls(crl_path)?),
        None => builder,
    };

    builder
        .build()
        .map_err(|e| Error::Tls(format!("Failed to build client verifier: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Peer certificate chain handed over by the TLS layer.
//!
//! By the time a request reaches a handler, rustls has already verified the
//! chain against the tenant CA. This module only carries it around and
//! renders a few fields for debug logs.

use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

// ─────────────────────────────────────────────────────────────────────────────
// Certificate chain
// ─────────────────────────────────────────────────────────────────────────────

/// DER certificates presented by the client, leaf first.
///
/// Cloning is cheap; the chain is shared between the connection and every
/// request served on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCertificateChain {
    certs: Arc<[CertificateDer<'static>]>,
}

impl ClientCertificateChain {
    /// The end-entity certificate, if any was presented.
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.certs.first()
    }

    /// Number of certificates in the chain.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// True when the client sent no certificate at all.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Certificates in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.certs.iter()
    }

    /// Subject/issuer summary of every certificate, for logging.
    ///
    /// Certificates that fail to parse are skipped.
    pub fn describe(&self) -> Vec<CertSummary> {
        self.iter().filter_map(|c| CertSummary::from_der(c)).collect()
    }
}

impl From<Vec<CertificateDer<'static>>> for ClientCertificateChain {
    fn from(certs: Vec<CertificateDer<'static>>) -> Self {
        Self {
            certs: certs.into(),
        }
    }
}

impl From<&[CertificateDer<'_>]> for ClientCertificateChain {
    fn from(certs: &[CertificateDer<'_>]) -> Self {
        certs
            .iter()
            .map(|c| c.clone().into_owned())
            .collect::<Vec<_>>()
            .into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Log summary
// ─────────────────────────────────────────────────────────────────────────────

/// Distinguished names of one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    /// RFC 4514 subject.
    pub subject: String,
    /// RFC 4514 issuer.
    pub issuer: String,
    /// Subject CN, when present.
    pub common_name: Option<String>,
}

impl CertSummary {
    fn from_der(der: &[u8]) -> Option<Self> {
        let (_, cert) = X509Certificate::from_der(der).ok()?;
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);

        Some(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            common_name,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Canonical textual form of public keys.
//!
//! The device puts its public key into the auth request as PEM text; the TLS
//! layer hands us the same key inside an X.509 certificate. Both sides are
//! compared through [`encode`], which renders a `SubjectPublicKeyInfo` exactly
//! the way the device tooling does: `PUBLIC KEY` armor, standard base64 body
//! folded at 64 columns, `\n` after every line.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_DSA: &str = "1.2.840.10040.4.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----\n";
const PEM_FOOTER: &str = "-----END PUBLIC KEY-----\n";
const PEM_LINE_WIDTH: usize = 64;

/// Key codec failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyCodecError {
    /// The key is not RSA, DSA or elliptic-curve.
    #[error("unrecognizable public key type: {0}")]
    UnsupportedKeyKind(String),

    /// The certificate or SPKI structure could not be decoded.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
}

/// Asymmetric key family, as announced by the SPKI algorithm identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// `rsaEncryption`
    Rsa,
    /// `id-dsa`
    Dsa,
    /// `id-ecPublicKey` (any named curve)
    Ec,
    /// Anything else, carrying the dotted algorithm OID.
    Other(String),
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => f.write_str("RSA"),
            Self::Dsa => f.write_str("DSA"),
            Self::Ec => f.write_str("EC"),
            Self::Other(oid) => write!(f, "unknown ({oid})"),
        }
    }
}

/// An owned public key lifted out of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    algorithm: KeyAlgorithm,
    spki_der: Vec<u8>,
    key_data: Vec<u8>,
}

impl PublicKey {
    /// Extract the subject public key of a DER-encoded certificate.
    pub fn from_certificate_der(der: &[u8]) -> Result<Self, KeyCodecError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| KeyCodecError::MalformedCertificate(e.to_string()))?;
        Ok(Self::from_spki(cert.public_key()))
    }

    /// Decode a DER `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, KeyCodecError> {
        let (_, spki) = SubjectPublicKeyInfo::from_der(der)
            .map_err(|e| KeyCodecError::MalformedCertificate(e.to_string()))?;
        Ok(Self::from_spki(&spki))
    }

    fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Self {
        let oid = spki.algorithm.algorithm.to_id_string();
        let algorithm = match oid.as_str() {
            OID_RSA_ENCRYPTION => KeyAlgorithm::Rsa,
            OID_DSA => KeyAlgorithm::Dsa,
            OID_EC_PUBLIC_KEY => KeyAlgorithm::Ec,
            _ => KeyAlgorithm::Other(oid),
        };

        Self {
            algorithm,
            spki_der: spki.raw.to_vec(),
            key_data: spki.subject_public_key.data.to_vec(),
        }
    }

    /// Key family.
    pub fn algorithm(&self) -> &KeyAlgorithm {
        &self.algorithm
    }

    /// The full DER `SubjectPublicKeyInfo`.
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// The bare key bits: PKCS#1 `RSAPublicKey` for RSA, the encoded point
    /// for EC, the integer `y` for DSA.
    pub fn key_data(&self) -> &[u8] {
        &self.key_data
    }
}

/// Render `key` in its canonical PEM form.
pub fn encode(key: &PublicKey) -> Result<String, KeyCodecError> {
    if let KeyAlgorithm::Other(oid) = key.algorithm() {
        return Err(KeyCodecError::UnsupportedKeyKind(oid.clone()));
    }

    let body = STANDARD.encode(key.spki_der());
    let mut pem = String::with_capacity(
        PEM_HEADER.len() + PEM_FOOTER.len() + body.len() + body.len() / PEM_LINE_WIDTH + 1,
    );

    pem.push_str(PEM_HEADER);
    for (i, c) in body.chars().enumerate() {
        if i > 0 && i % PEM_LINE_WIDTH == 0 {
            pem.push('\n');
        }
        pem.push(c);
    }
    pem.push('\n');
    pem.push_str(PEM_FOOTER);

    Ok(pem)
}

//! Mutual TLS and device key handling.
//!
//! # Architecture
//!
//! ```text
//! TCP connection
//!   → TLS handshake  (rustls verifies client cert against the tenant CA)
//!   → ClientCertificateChain captured from the session
//!   → TlsConnectInfo attached to every request on the connection
//!   → auth request: leaf key canonicalized and compared to `pubkey`,
//!     X-MEN-Signature checked over the raw body
//! ```
//!
//! # Modules
//!
//! - [`cert_manager`] - rustls server config, PEM loading
//! - [`listener`] - TLS listener for `axum::serve` (`TlsListener`, `TlsConnectInfo`)
//! - [`identity`] - the presented chain (`ClientCertificateChain`)
//! - [`key_codec`] - canonical PEM form of a certificate public key
//! - [`signature`] - request signature verification

pub mod cert_manager;
pub mod identity;
pub mod key_codec;
pub mod listener;
pub mod signature;

pub use cert_manager::{build_tls_config, load_certs, load_crls, load_private_key};
pub use identity::{CertSummary, ClientCertificateChain};
pub use key_codec::{KeyAlgorithm, KeyCodecError, PublicKey};
pub use listener::{TlsConnectInfo, TlsListener};
pub use signature::SignatureError;

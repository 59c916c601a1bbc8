//! mTLS ambassador for the Mender device API
//!
//! Sits in front of a Mender server and forwards device API traffic. The
//! device auth request (`POST /api/devices/v1/authentication/auth_requests`)
//! is intercepted first:
//!
//! - the TLS client certificate must carry the same public key as the
//!   request's `pubkey`
//! - `X-MEN-Signature` must verify over the raw body under that key
//! - the device identity is preauthorized with the backend (an existing
//!   preauthorization is fine)
//!
//! Only then is the request forwarded, so devices holding a certificate from
//! the tenant CA are accepted without manual admission.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mtls;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}

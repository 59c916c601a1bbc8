//! Error types for the ambassador process
//!
//! Per-request failures have their own enums next to the code that raises
//! them (`VerifyError`, `PreauthError`, `ClientError`, ...). This type covers
//! startup: configuration, TLS material, the initial backend login.

use std::io;

use thiserror::Error;

use crate::client::ClientError;

/// Result type alias for the ambassador
pub type Result<T> = std::result::Result<T, Error>;

/// Ambassador errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS material could not be loaded or assembled
    #[error("TLS error: {0}")]
    Tls(String),

    /// Backend client failure (login at startup, client construction)
    #[error("Backend error: {0}")]
    Backend(#[from] ClientError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

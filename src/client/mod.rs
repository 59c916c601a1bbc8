//! Mender management API client
//!
//! Two calls are needed: a service-account login that yields a bearer token,
//! and device preauthorization. The client keeps no state besides the
//! connection pool; the token is passed in on every preauthorization.

pub mod models;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

pub use models::{AuthRequest, PreauthRequest};

/// useradm login endpoint
pub const LOGIN_URL: &str = "/api/management/v1/useradm/auth/login";
/// devauth preauthorization endpoint
pub const PREAUTH_URL: &str = "/api/management/v2/devauth/devices";
/// Per-request timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend call failures
#[derive(Debug, Error)]
pub enum ClientError {
    /// Login rejected the credentials
    #[error("unauthorized")]
    Unauthorized,

    /// The device is already preauthorized
    #[error("preauth conflict")]
    Conflict,

    /// Any other status code
    #[error("unexpected response from {operation}: HTTP {status}\n{body}")]
    UnexpectedStatus {
        /// `login` or `preauth`
        operation: &'static str,
        /// Status returned by the backend
        status: StatusCode,
        /// Response body, verbatim
        body: String,
    },

    /// `id_data` is not a JSON object
    #[error("invalid identity data: {0}")]
    InvalidIdentityData(#[from] serde_json::Error),

    /// Connection failure, timeout, or client construction failure
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Operations the ambassador needs from the backend.
#[async_trait]
pub trait DeviceAuthClient: Send + Sync {
    /// Log in with HTTP basic auth and return the bearer token.
    async fn login(&self, user: &str, password: &str) -> Result<String, ClientError>;

    /// Preauthorize a device identity/key pair.
    ///
    /// `id_data` is the JSON object string from the auth request. It is
    /// parsed before any network traffic.
    async fn preauthorize(&self, id_data: &str, pubkey: &str, token: &str)
    -> Result<(), ClientError>;
}

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on each backend request
    pub timeout: Duration,
    /// Accept any backend certificate
    pub insecure_skip_verify: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

/// `reqwest`-backed [`DeviceAuthClient`]
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>, options: &ClientOptions) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        let http = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure_skip_verify)
            .build()?;

        info!(base_url = %base_url, "created client");

        Ok(Self { http, base_url })
    }

    /// Backend base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DeviceAuthClient for HttpClient {
    async fn login(&self, user: &str, password: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(join(&self.base_url, LOGIN_URL))
            .basic_auth(user, Some(password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            status => Err(ClientError::UnexpectedStatus {
                operation: "login",
                status,
                body,
            }),
        }
    }

    async fn preauthorize(
        &self,
        id_data: &str,
        pubkey: &str,
        token: &str,
    ) -> Result<(), ClientError> {
        let request = PreauthRequest::new(id_data, pubkey)?;

        let response = self
            .http
            .post(join(&self.base_url, PREAUTH_URL))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "preauth response");

        match status {
            StatusCode::CREATED => Ok(()),
            StatusCode::CONFLICT => Err(ClientError::Conflict),
            status => Err(ClientError::UnexpectedStatus {
                operation: "preauth",
                status,
                body: response.text().await?,
            }),
        }
    }
}

/// Join `base` and `path` with exactly one `/` between them.
pub fn join(base: &str, path: &str) -> String {
    let path = path.strip_prefix('/').unwrap_or(path);
    if base.ends_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

//! Device API interception.
//!
//! Every request under `/api/devices/` passes through [`ProxyController`].
//! All of them are forwarded except the auth request, which is first
//! checked against the client certificate and preauthorized.

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tracing::{Instrument, debug, error, info, info_span};

use super::proxy::Proxy;
use crate::app::{App, PreauthError};
use crate::client::AuthRequest;
use crate::mtls::{ClientCertificateChain, TlsConnectInfo};

/// Path of the device auth request
pub const AUTH_REQUESTS_PATH: &str = "/api/devices/v1/authentication/auth_requests";
/// Header carrying the base64 body signature
pub const SIGNATURE_HEADER: &str = "X-MEN-Signature";
/// Header carrying the request id
pub const REQUEST_ID_HEADER: &str = "X-MEN-RequestID";
/// Largest auth request body that will be buffered
pub const MAX_AUTH_REQUEST_BODY: usize = 1024 * 1024;

/// A request body read fully into memory so it can be inspected and then
/// sent on unchanged.
#[derive(Debug, Clone)]
pub struct BufferedBody(Bytes);

impl BufferedBody {
    /// Read `body` completely, failing past `limit` bytes.
    pub async fn read(body: Body, limit: usize) -> Result<Self, axum::Error> {
        axum::body::to_bytes(body, limit).await.map(Self)
    }

    /// The bytes exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Turn the buffer back into a body.
    pub fn into_body(self) -> Body {
        Body::from(self.0)
    }
}

/// Decides, per request, between plain forwarding and the auth flow.
pub struct ProxyController<A, P> {
    app: A,
    proxy: P,
}

impl<A, P> ProxyController<A, P>
where
    A: App,
    P: Proxy,
{
    /// Create a controller.
    pub fn new(app: A, proxy: P) -> Self {
        Self { app, proxy }
    }

    /// Handle one device API request.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        if !is_auth_request(request.uri()) {
            return self.proxy.forward(request).await;
        }

        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        self.intercept(request)
            .instrument(info_span!("auth_request", request_id = %request_id))
            .await
    }

    async fn intercept(&self, request: Request<Body>) -> Response {
        debug!("auth request intercepted");
        let (parts, body) = request.into_parts();

        let body = match BufferedBody::read(body, MAX_AUTH_REQUEST_BODY).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "reading auth request failed");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let auth_request: AuthRequest = match serde_json::from_slice(body.as_bytes()) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "parsing auth request failed");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let chain = parts
            .extensions
            .get::<ConnectInfo<TlsConnectInfo>>()
            .map(|ConnectInfo(info)| info.peer_certificates.clone())
            .unwrap_or_default();
        log_chain(&chain);

        let signature = parts
            .headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if let Err(e) =
            self.app
                .verify_client_cert(&chain, &auth_request, body.as_bytes(), signature)
        {
            error!(error = %e, "verifying client cert failed");
            return StatusCode::BAD_REQUEST.into_response();
        }
        debug!("verifying client cert: ok");

        match self.app.preauth(&auth_request).await {
            Ok(()) => debug!("preauthorizing: ok"),
            Err(PreauthError::Conflict) => {
                info!("preauthorization conflict detected, device already known, proceeding");
            }
            Err(e) => {
                error!(error = %e, "preauthorization failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }

        self.proxy
            .forward(Request::from_parts(parts, body.into_body()))
            .await
    }
}

/// Compares the decoded path, as the backend will see it.
fn is_auth_request(uri: &Uri) -> bool {
    percent_decode_str(uri.path()).decode_utf8_lossy() == AUTH_REQUESTS_PATH
}

fn log_chain(chain: &ClientCertificateChain) {
    for (depth, cert) in chain.describe().iter().enumerate() {
        debug!(
            depth,
            common_name = cert.common_name.as_deref().unwrap_or_default(),
            subject = %cert.subject,
            issuer = %cert.issuer,
            "client certificate"
        );
    }
}

//! Forwarding to the Mender backend.
//!
//! Requests keep their method, path, query, headers and body; only the scheme
//! and authority are swapped for the backend's. Bodies are streamed in both
//! directions without buffering.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::mtls::TlsConnectInfo;
use crate::{Error, Result};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Something that can pass a request on and hand back the answer.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Forward `request` and return the upstream response.
    ///
    /// Never fails: an unreachable upstream is reported as `502`.
    async fn forward(&self, request: Request<Body>) -> Response;
}

/// Reverse proxy to a fixed backend.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    http: Client,
    backend: Url,
}

impl ReverseProxy {
    /// Create a proxy for `backend_url`. Only its scheme and authority are
    /// used; any path on it is ignored.
    pub fn new(backend_url: &str, insecure_skip_verify: bool) -> Result<Self> {
        let backend = Url::parse(backend_url)
            .map_err(|e| Error::Config(format!("Invalid backend URL '{backend_url}': {e}")))?;
        if !matches!(backend.scheme(), "http" | "https") || backend.host_str().is_none() {
            return Err(Error::Config(format!(
                "Backend URL must be http(s)://host[:port], got '{backend_url}'"
            )));
        }

        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build proxy client: {e}")))?;

        info!(
            scheme = backend.scheme(),
            host = backend.host_str().unwrap_or_default(),
            port = backend.port_or_known_default(),
            "created proxy"
        );

        Ok(Self { http, backend })
    }

    fn target(&self, uri: &Uri) -> Url {
        let mut target = self.backend.clone();
        target.set_path(uri.path());
        target.set_query(uri.query());
        target
    }
}

#[async_trait]
impl Proxy for ReverseProxy {
    async fn forward(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let target = self.target(&parts.uri);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        if let Some(ConnectInfo(info)) = parts.extensions.get::<ConnectInfo<TlsConnectInfo>>() {
            append_forwarded_for(&mut headers, info.remote_addr);
        }

        debug!(method = %parts.method, target = %target, "forwarding");

        // Content-Length, when the client sent one, still frames the stream
        let mut upstream = self.http.request(parts.method, target).headers(headers);
        if !body.is_end_stream() {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match upstream.send().await {
            Ok(resp) => {
                let status = resp.status();
                let mut headers = resp.headers().clone();
                strip_hop_by_hop(&mut headers);

                let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(e) => {
                warn!(error = %e, "backend unreachable");
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection may name further per-hop headers
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(&named) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, remote: SocketAddr) {
    let ip = remote.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

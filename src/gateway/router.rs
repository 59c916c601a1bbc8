//! HTTP router and handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use super::controller::ProxyController;
use super::proxy::Proxy;
use crate::app::App;
use crate::mtls::TlsConnectInfo;

/// Status endpoint
pub const STATUS_PATH: &str = "/status";
/// Everything the controller sees
pub const DEVICE_API_PATH: &str = "/api/devices/{*path}";

/// Create the router
pub fn create_router<A, P>(controller: Arc<ProxyController<A, P>>) -> Router
where
    A: App + 'static,
    P: Proxy + 'static,
{
    Router::new()
        .route(STATUS_PATH, get(status_handler))
        .route(DEVICE_API_PATH, any(device_api_handler::<A, P>))
        .layer(middleware::from_fn(access_log))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(controller)
}

/// GET /status
async fn status_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Any method on /api/devices/*
async fn device_api_handler<A, P>(
    State(controller): State<Arc<ProxyController<A, P>>>,
    request: Request,
) -> Response
where
    A: App,
    P: Proxy,
{
    controller.handle(request).await
}

/// One line per request, level by status: 5xx error, 4xx warn, else info.
async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<TlsConnectInfo>>()
        .map(|ConnectInfo(info)| info.remote_addr.ip().to_string())
        .unwrap_or_default();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    macro_rules! access {
        ($level:ident) => {
            $level!(
                r#type = "http",
                status,
                responsetime = latency_ms,
                method = %method,
                path = %path,
                clientip = %client_ip,
                user_agent = %user_agent,
                "{status} {latency_ms:.3}ms {method} {path}"
            )
        };
    }

    if status > 499 {
        access!(error);
    } else if status > 399 {
        access!(warn);
    } else {
        access!(info);
    }

    response
}

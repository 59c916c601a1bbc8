//! Ambassador server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::signal;
use tracing::{info, warn};

use super::controller::ProxyController;
use super::proxy::ReverseProxy;
use super::router::create_router;
use crate::app::{Ambassador, LoginTokenProvider};
use crate::client::{ClientOptions, HttpClient};
use crate::config::Config;
use crate::mtls::{TlsConnectInfo, TlsListener, build_tls_config};
use crate::{Error, Result};

/// mTLS ambassador server, bound and logged in, ready to serve.
pub struct Server {
    listener: TlsListener,
    router: Router,
}

impl Server {
    /// Load TLS material, log in to the backend, and bind the listen address.
    ///
    /// Fails if any of those steps fails; a rejected login is fatal.
    pub async fn new(config: &Config) -> Result<Self> {
        let tls = Arc::new(build_tls_config(config)?);

        let proxy = ReverseProxy::new(&config.mender_backend, config.insecure_skip_verify)?;
        let client = HttpClient::new(
            config.mender_backend.as_str(),
            &ClientOptions {
                timeout: config.backend_timeout,
                insecure_skip_verify: config.insecure_skip_verify,
            },
        )?;

        let auth = LoginTokenProvider::login(&client, &config.mender_user, &config.mender_pass)
            .await?;

        let app = Ambassador::new(client, auth);
        let router = create_router(Arc::new(ProxyController::new(app, proxy)));

        let listener = TlsListener::bind(config.listen_addr(), tls).await?;

        Ok(Self { listener, router })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        use axum::serve::Listener as _;
        self.listener.local_addr().map_err(Error::Io)
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` completes, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;

        info!("============================================================");
        info!("MTLS AMBASSADOR v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %addr, "Listening (mTLS, client certificate required)");
        info!("  GET  /status");
        info!("  ANY  /api/devices/*  (auth requests verified and preauthorized)");
        info!("============================================================");

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<TlsConnectInfo>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

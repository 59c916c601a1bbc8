//! TLS-terminating listener for `axum::serve`.
//!
//! TCP connections are accepted on a background task; every handshake then
//! runs on its own task so a slow or hostile client cannot hold up the
//! accept loop. Finished handshakes are queued for the HTTP server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::Connected;
use axum::serve::{IncomingStream, Listener};
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

use super::identity::ClientCertificateChain;

/// Upper bound on a single TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const PENDING_CONNECTIONS: usize = 128;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

type Established = (TlsStream<TcpStream>, SocketAddr);

/// Listener yielding TLS streams whose handshake already completed.
pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<Established>,
}

impl TlsListener {
    /// Bind `addr` and start accepting TLS connections with `config`.
    pub async fn bind(addr: impl ToSocketAddrs, config: Arc<ServerConfig>) -> io::Result<Self> {
        let tcp = TcpListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;
        let (tx, ready) = mpsc::channel(PENDING_CONNECTIONS);

        tokio::spawn(accept_loop(tcp, TlsAcceptor::from(config), tx));

        Ok(Self { local_addr, ready })
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(conn) => conn,
            // accept loop is gone; nothing will ever arrive
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

async fn accept_loop(tcp: TcpListener, acceptor: TlsAcceptor, tx: mpsc::Sender<Established>) {
    loop {
        let accepted = tokio::select! {
            () = tx.closed() => break,
            accepted = tcp.accept() => accepted,
        };

        let (stream, remote_addr) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "TCP accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    let _ = tx.send((tls, remote_addr)).await;
                }
                Ok(Err(e)) => debug!(peer = %remote_addr, error = %e, "TLS handshake failed"),
                Err(_) => debug!(peer = %remote_addr, "TLS handshake timed out"),
            }
        });
    }
}

/// Per-connection data made available to handlers through
/// `ConnectInfo<TlsConnectInfo>`.
#[derive(Debug, Clone)]
pub struct TlsConnectInfo {
    /// Client socket address.
    pub remote_addr: SocketAddr,
    /// Certificates the client presented, leaf first.
    pub peer_certificates: ClientCertificateChain,
}

impl Connected<IncomingStream<'_, TlsListener>> for TlsConnectInfo {
    fn connect_info(stream: IncomingStream<'_, TlsListener>) -> Self {
        let (_, session) = stream.io().get_ref();
        Self {
            remote_addr: *stream.remote_addr(),
            peer_certificates: session
                .peer_certificates()
                .map(ClientCertificateChain::from)
                .unwrap_or_default(),
        }
    }
}

//! HTTP side of the ambassador: interception, forwarding, routing, serving.

pub mod controller;
pub mod proxy;
pub mod router;
mod server;

pub use controller::{AUTH_REQUESTS_PATH, BufferedBody, ProxyController, SIGNATURE_HEADER};
pub use proxy::{Proxy, ReverseProxy};
pub use router::create_router;
pub use server::Server;

//! Shared helpers for integration tests: a mock Mender backend, a throwaway
//! tenant PKI and a minimal mTLS HTTP/1.1 client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, RSA_PKCS1_SHA256, RsaKeyPair,
};
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::post;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, PublicKeyData as _,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsConnector;

use mtls_ambassador::client::{LOGIN_URL, PREAUTH_URL};
use mtls_ambassador::mtls::key_codec::{self, PublicKey};

pub const RSA_KEY: &str = include_str!("../fixtures/device_rsa.key");
pub const RSA_PUB: &str = include_str!("../fixtures/device_rsa.pub.pem");
pub const SIGNED_BODY: &str = include_str!("../fixtures/auth_request.json");
pub const OPENSSL_SIGNATURE: &str = include_str!("../fixtures/auth_request.sig");

pub const BACKEND_TOKEN: &str = "backend-token";

// ─────────────────────────────────────────────────────────────────────────────
// Mock Mender backend
// ─────────────────────────────────────────────────────────────────────────────

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    async fn capture(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body: axum::body::to_bytes(body, usize::MAX).await.unwrap(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Scripted backend behaviour and everything it received.
pub struct BackendState {
    pub login_status: AtomicU16,
    pub preauth_status: AtomicU16,
    pub delay: Mutex<Option<Duration>>,
    pub logins: Mutex<Vec<Recorded>>,
    pub preauths: Mutex<Vec<Recorded>>,
    pub forwarded: Mutex<Vec<Recorded>>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            login_status: AtomicU16::new(200),
            preauth_status: AtomicU16::new(201),
            delay: Mutex::new(None),
            logins: Mutex::new(Vec::new()),
            preauths: Mutex::new(Vec::new()),
            forwarded: Mutex::new(Vec::new()),
        }
    }
}

impl BackendState {
    pub fn set_login_status(&self, status: u16) {
        self.login_status.store(status, Ordering::SeqCst);
    }

    pub fn set_preauth_status(&self, status: u16) {
        self.preauth_status.store(status, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn preauths(&self) -> Vec<Recorded> {
        self.preauths.lock().unwrap().clone()
    }

    pub fn forwarded(&self) -> Vec<Recorded> {
        self.forwarded.lock().unwrap().clone()
    }

    pub fn logins(&self) -> Vec<Recorded> {
        self.logins.lock().unwrap().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let router = Router::new()
            .route(LOGIN_URL, post(login))
            .route(PREAUTH_URL, post(preauth))
            .fallback(forwarded)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn login(State(state): State<Arc<BackendState>>, request: Request) -> Response {
    let recorded = Recorded::capture(request).await;
    state.logins.lock().unwrap().push(recorded);
    state.pause().await;

    let status = StatusCode::from_u16(state.login_status.load(Ordering::SeqCst)).unwrap();
    if status == StatusCode::OK {
        BACKEND_TOKEN.into_response()
    } else {
        (status, "login refused").into_response()
    }
}

async fn preauth(State(state): State<Arc<BackendState>>, request: Request) -> Response {
    let recorded = Recorded::capture(request).await;
    state.preauths.lock().unwrap().push(recorded);
    state.pause().await;

    let status = StatusCode::from_u16(state.preauth_status.load(Ordering::SeqCst)).unwrap();
    (status, "preauth says no").into_response()
}

async fn forwarded(State(state): State<Arc<BackendState>>, request: Request) -> Response {
    let recorded = Recorded::capture(request).await;
    let reply = format!("backend saw {} {}", recorded.method, recorded.path);
    state.forwarded.lock().unwrap().push(recorded);

    (StatusCode::OK, [("x-backend", "mock")], reply).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant PKI
// ─────────────────────────────────────────────────────────────────────────────

fn named(cn: &str, sans: &[&str]) -> CertificateParams {
    let mut params =
        CertificateParams::new(sans.iter().map(|s| (*s).to_string()).collect::<Vec<_>>())
            .unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params
}

fn device_params(cn: &str) -> CertificateParams {
    let mut params = named(cn, &[]);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params
}

/// A CA plus helpers to issue server and device certificates.
pub struct Pki {
    pub ca_pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl Pki {
    pub fn new(cn: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = named(cn, &[]);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.clone().self_signed(&key).unwrap();
        Self {
            ca_pem: cert.pem(),
            issuer: Issuer::new(params, key),
        }
    }

    /// Server certificate and key PEM for 127.0.0.1 / localhost.
    pub fn server(&self) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let mut params = named("mtls-ambassador", &["127.0.0.1", "localhost"]);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    /// Device with a fresh P-256 key.
    pub fn ec_device(&self, cn: &str) -> Device {
        let key = KeyPair::generate().unwrap();
        let cert = device_params(cn).signed_by(&key, &self.issuer).unwrap();
        let public = PublicKey::from_spki_der(&key.subject_public_key_info()).unwrap();
        let pubkey_pem = key_codec::encode(&public).unwrap();
        let signer =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.serialize_der())
                .unwrap();

        Device {
            cert_der: cert.der().clone(),
            key_der: PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
            pubkey_pem,
            signer: Signer::Ec(signer),
        }
    }

    /// Device using the OpenSSL-generated RSA fixture key.
    pub fn rsa_fixture_device(&self, cn: &str) -> Device {
        let key = KeyPair::from_pem(RSA_KEY).unwrap();
        let cert = device_params(cn).signed_by(&key, &self.issuer).unwrap();
        let key_der = rustls_pemfile::private_key(&mut RSA_KEY.as_bytes())
            .unwrap()
            .unwrap();
        let signer = RsaKeyPair::from_pkcs8(key_der.secret_der()).unwrap();

        Device {
            cert_der: cert.der().clone(),
            key_der,
            pubkey_pem: RSA_PUB.to_string(),
            signer: Signer::Rsa(signer),
        }
    }
}

enum Signer {
    Ec(EcdsaKeyPair),
    Rsa(RsaKeyPair),
}

/// Device certificate, TLS key, canonical public key and a body signer.
pub struct Device {
    pub cert_der: CertificateDer<'static>,
    pub key_der: PrivateKeyDer<'static>,
    pub pubkey_pem: String,
    signer: Signer,
}

impl Device {
    /// Base64 signature over `body`, as sent in `X-MEN-Signature`.
    pub fn sign(&self, body: &[u8]) -> String {
        let rng = SystemRandom::new();
        match &self.signer {
            Signer::Ec(key) => STANDARD.encode(key.sign(&rng, body).unwrap().as_ref()),
            Signer::Rsa(key) => {
                let mut sig = vec![0; key.public_modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &rng, body, &mut sig).unwrap();
                STANDARD.encode(sig)
            }
        }
    }

    /// JSON auth request body for this device.
    pub fn auth_request_body(&self, id_data: &str) -> String {
        serde_json::json!({
            "id_data": id_data,
            "pubkey": self.pubkey_pem,
            "tenant_token": "token",
        })
        .to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// mTLS client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One HTTP/1.1 request over TLS, presenting `device`'s certificate if given.
pub async fn send(
    addr: SocketAddr,
    ca_pem: &str,
    device: Option<&Device>,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> std::io::Result<RawResponse> {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut ca_pem.as_bytes()) {
        roots.add(cert.unwrap()).unwrap();
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots);
    let config = match device {
        Some(d) => builder
            .with_client_auth_cert(vec![d.cert_der.clone()], d.key_der.clone_key())
            .unwrap(),
        None => builder.with_no_client_auth(),
    };

    let tcp = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from("127.0.0.1").unwrap();
    let mut tls = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await?;

    let mut head = format!(
        "{method} {path} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\
         Content-Length: {}\r\nConnection: close\r\n",
        addr.port(),
        body.len()
    );
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    tls.write_all(head.as_bytes()).await?;
    tls.write_all(body).await?;
    tls.flush().await?;

    let mut raw = Vec::new();
    tls.read_to_end(&mut raw).await?;
    Ok(parse_response(&raw))
}

fn parse_response(raw: &[u8]) -> RawResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(raw.len());
    let head = String::from_utf8_lossy(&raw[..split]);
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let body = raw.get(split + 4..).unwrap_or_default().to_vec();
    let chunked = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.contains("chunked"));

    RawResponse {
        status,
        body: if chunked { dechunk(&body) } else { body },
        headers,
    }
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(eol) = data.windows(2).position(|w| w == b"\r\n") {
        let size = usize::from_str_radix(String::from_utf8_lossy(&data[..eol]).trim(), 16)
            .unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = eol + 2;
        out.extend_from_slice(&data[start..start + size]);
        data = &data[start + size + 2..];
    }
    out
}

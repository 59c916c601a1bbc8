//! Device identity verification and provisioning.
//!
//! [`App`] exposes the two steps the auth request interceptor runs in order:
//! binding the TLS client certificate to the signed request, then
//! preauthorizing the device with the backend.

pub mod auth_provider;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::client::{AuthRequest, ClientError, DeviceAuthClient};
use crate::mtls::identity::ClientCertificateChain;
use crate::mtls::key_codec::{self, KeyCodecError, PublicKey};
use crate::mtls::signature::{self, SignatureError};

pub use auth_provider::{AuthProvider, LoginTokenProvider};

/// Why a client certificate does not vouch for an auth request.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The TLS session carried no client certificate.
    #[error("need at least one client certificate")]
    NoCertificates,

    /// Leaf certificate key differs from `pubkey` in the request.
    #[error("certificate key and auth request key don't match")]
    KeyMismatch,

    /// `X-MEN-Signature` does not verify over the body.
    #[error("invalid request signature: {0}")]
    BadSignature(#[from] SignatureError),

    /// Leaf key could not be put in canonical form.
    #[error("cannot encode certificate key: {0}")]
    KeyEncoding(#[from] KeyCodecError),
}

/// Preauthorization outcome other than plain success.
#[derive(Debug, Error)]
pub enum PreauthError {
    /// Device was already preauthorized. Callers treat this as success.
    #[error("preauth conflict")]
    Conflict,

    /// Anything else the backend client reported.
    #[error(transparent)]
    Client(ClientError),
}

impl From<ClientError> for PreauthError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Conflict => Self::Conflict,
            other => Self::Client(other),
        }
    }
}

/// Verification and provisioning steps used by the interceptor.
#[async_trait]
pub trait App: Send + Sync {
    /// Check that `chain`'s leaf key matches `request.pubkey` and that
    /// `signature` verifies over `body`. No side effects.
    fn verify_client_cert(
        &self,
        chain: &ClientCertificateChain,
        request: &AuthRequest,
        body: &[u8],
        signature: &str,
    ) -> Result<(), VerifyError>;

    /// Preauthorize the request's identity and key with the backend.
    async fn preauth(&self, request: &AuthRequest) -> Result<(), PreauthError>;
}

/// Production [`App`] over a backend client and a token source.
pub struct Ambassador<C, P> {
    client: C,
    auth: P,
}

impl<C, P> Ambassador<C, P>
where
    C: DeviceAuthClient,
    P: AuthProvider,
{
    /// Wire the service to its collaborators.
    pub fn new(client: C, auth: P) -> Self {
        Self { client, auth }
    }
}

#[async_trait]
impl<C, P> App for Ambassador<C, P>
where
    C: DeviceAuthClient,
    P: AuthProvider,
{
    fn verify_client_cert(
        &self,
        chain: &ClientCertificateChain,
        request: &AuthRequest,
        body: &[u8],
        signature: &str,
    ) -> Result<(), VerifyError> {
        let leaf = chain.leaf().ok_or(VerifyError::NoCertificates)?;

        let key = PublicKey::from_certificate_der(leaf)?;
        let canonical = key_codec::encode(&key)?;
        if canonical != request.pubkey {
            debug!(algorithm = %key.algorithm(), "certificate key differs from auth request key");
            return Err(VerifyError::KeyMismatch);
        }

        signature::verify(signature, &key, body)?;
        Ok(())
    }

    async fn preauth(&self, request: &AuthRequest) -> Result<(), PreauthError> {
        self.client
            .preauthorize(&request.id_data, &request.pubkey, self.auth.token())
            .await
            .map_err(PreauthError::from)
    }
}

//! Auth request signature verification.
//!
//! Devices sign the raw auth request body with their private key and send the
//! result, base64-encoded, in `X-MEN-Signature`. Verification always runs over
//! the bytes exactly as they came off the wire. SHA-256 is the only digest.

use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P384_SHA256_ASN1, RSA_PKCS1_2048_8192_SHA256,
    UnparsedPublicKey, VerificationAlgorithm,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

use super::key_codec::{KeyAlgorithm, PublicKey};

// Uncompressed SEC1 points: 0x04 || X || Y
const P256_POINT_LEN: usize = 65;
const P384_POINT_LEN: usize = 97;

/// Why a signature was rejected. Callers treat every variant the same way.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Header value is not standard base64.
    #[error("signature is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// No signature scheme for this key.
    #[error("no signature scheme for {0} keys")]
    UnsupportedKey(String),

    /// Signature does not match the body under this key.
    #[error("signature verification failed")]
    Mismatch,
}

/// Check `signature_b64` against `message` under `key`.
pub fn verify(signature_b64: &str, key: &PublicKey, message: &[u8]) -> Result<(), SignatureError> {
    let signature = STANDARD.decode(signature_b64)?;
    let algorithm = scheme_for(key)?;

    UnparsedPublicKey::new(algorithm, key.key_data())
        .verify(message, &signature)
        .map_err(|_| SignatureError::Mismatch)
}

fn scheme_for(key: &PublicKey) -> Result<&'static dyn VerificationAlgorithm, SignatureError> {
    match key.algorithm() {
        KeyAlgorithm::Rsa => Ok(&RSA_PKCS1_2048_8192_SHA256),
        KeyAlgorithm::Ec => match key.key_data().len() {
            P256_POINT_LEN => Ok(&ECDSA_P256_SHA256_ASN1),
            P384_POINT_LEN => Ok(&ECDSA_P384_SHA256_ASN1),
            other => Err(SignatureError::UnsupportedKey(format!(
                "EC ({other}-byte point)"
            ))),
        },
        other => Err(SignatureError::UnsupportedKey(other.to_string())),
    }
}

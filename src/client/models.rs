//! Wire types exchanged with devices and the Mender backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/devices/v1/authentication/auth_requests`.
///
/// Absent fields deserialize as empty strings; only malformed JSON is a
/// parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRequest {
    /// Identity attributes, itself a JSON object encoded as a string.
    pub id_data: String,
    /// Tenant token; passed through untouched.
    pub tenant_token: String,
    /// Device public key in PEM form.
    pub pubkey: String,
}

/// Body of the management API preauthorization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreauthRequest {
    /// Parsed identity attributes.
    pub identity_data: Map<String, Value>,
    /// Device public key in PEM form.
    pub pubkey: String,
}

impl PreauthRequest {
    /// Parse `id_data` and pair it with `pubkey`.
    pub fn new(id_data: &str, pubkey: &str) -> serde_json::Result<Self> {
        Ok(Self {
            identity_data: serde_json::from_str(id_data)?,
            pubkey: pubkey.to_owned(),
        })
    }
}

//! Service credential for backend calls.

use tracing::info;

use crate::client::{ClientError, DeviceAuthClient};

/// Source of the bearer token used for preauthorization.
pub trait AuthProvider: Send + Sync {
    /// Current token. Never touches the network.
    fn token(&self) -> &str;
}

/// Token obtained by a single login at startup.
///
/// The token is never refreshed; once the backend expires it, every
/// preauthorization fails until the process restarts.
pub struct LoginTokenProvider {
    token: String,
}

impl LoginTokenProvider {
    /// Log in as `user` and keep the resulting token.
    pub async fn login<C>(client: &C, user: &str, password: &str) -> Result<Self, ClientError>
    where
        C: DeviceAuthClient + ?Sized,
    {
        info!(user = %user, "logging in to backend");
        let token = client.login(user, password).await?;
        info!(user = %user, "backend login ok");

        Ok(Self { token })
    }
}

impl AuthProvider for LoginTokenProvider {
    fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for LoginTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

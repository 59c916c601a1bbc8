//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::DEFAULT_TIMEOUT;
use crate::{Error, Result};

/// Config file read when `--config` is not given, if present.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Prefix of configuration environment variables (`MTLS_MENDER_BACKEND`, ...).
pub const ENV_PREFIX: &str = "MTLS_";

/// Ambassador configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address; `:port` binds every interface
    pub listen: String,
    /// Mender base URL (scheme + host:port)
    pub mender_backend: String,
    /// Service account used for preauthorization
    pub mender_user: String,
    /// Service account password
    pub mender_pass: String,
    /// HTTPS server certificate (PEM, may include the chain)
    pub server_cert: String,
    /// HTTPS server private key (PEM)
    pub server_key: String,
    /// Tenant CA used to verify device certificates (PEM)
    pub tenant_ca_pem: String,
    /// Optional CRL for device certificates (PEM)
    pub crl_pem: Option<String>,
    /// Skip backend certificate verification
    pub insecure_skip_verify: bool,
    /// Timeout for each backend call
    #[serde(with = "humantime_serde")]
    pub backend_timeout: Duration,
    /// Force debug logging
    pub debug_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ":8080".to_string(),
            mender_backend: String::new(),
            mender_user: String::new(),
            mender_pass: String::new(),
            server_cert: "/etc/mtls/certs/server/server.crt".to_string(),
            server_key: "/etc/mtls/certs/server/server.key".to_string(),
            tenant_ca_pem: "/etc/mtls/certs/tenant-ca/tenant.ca.pem".to_string(),
            crl_pem: None,
            insecure_skip_verify: false,
            backend_timeout: DEFAULT_TIMEOUT,
            debug_log: false,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the YAML file, then `MTLS_*`
    /// environment variables.
    ///
    /// With no explicit `path`, `config.yaml` in the working directory is
    /// used when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                info!(path = %p.display(), "loading config");
                figment = figment.merge(Yaml::file(p));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!(path = DEFAULT_CONFIG_FILE, "loading config");
                figment = figment.merge(Yaml::file(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject configurations missing a required setting.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("mender_backend", &self.mender_backend),
            ("mender_user", &self.mender_user),
            ("mender_pass", &self.mender_pass),
        ];

        for (key, value) in required {
            if value.is_empty() {
                return Err(Error::Config(format!(
                    "validating config failed: need setting {key}"
                )));
            }
        }

        if self.backend_timeout.is_zero() {
            return Err(Error::Config("backend_timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Socket address to bind, with `:port` and bare `port` expanded to all
    /// interfaces.
    pub fn listen_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else if !self.listen.contains(':') {
            format!("0.0.0.0:{}", self.listen)
        } else {
            self.listen.clone()
        }
    }

    /// Log the effective settings. The password is reported only as
    /// `empty` or `not empty`.
    pub fn dump(&self) {
        info!("config values:");
        info!(" listen: {}", self.listen);
        info!(" mender_backend: {}", self.mender_backend);
        info!(" mender_user: {}", self.mender_user);
        info!(" mender_pass: {}", self.masked_password());
        info!(" server_cert: {}", self.server_cert);
        info!(" server_key: {}", self.server_key);
        info!(" tenant_ca_pem: {}", self.tenant_ca_pem);
        info!(" crl_pem: {}", self.crl_pem.as_deref().unwrap_or("none"));
        info!(" insecure_skip_verify: {}", self.insecure_skip_verify);
        info!(" backend_timeout: {:?}", self.backend_timeout);
        info!(" debug_log: {}", self.debug_log);
    }

    fn masked_password(&self) -> &'static str {
        if self.mender_pass.is_empty() {
            "empty"
        } else {
            "not empty"
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms").
    /// A bare number means seconds.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => return Ok(Duration::from_secs(secs)),
            Raw::Text(s) => s,
        };
        let s = s.trim();

        // "ms" before "s": both end in 's'
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

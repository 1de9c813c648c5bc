//! Configuration for constructing a backend.

use std::env;
use std::time::Duration;

/// Backend configuration, loadable from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the backend (e.g. `https://records.example.com`).
    pub base_url: String,
    /// Request timeout applied by the transport.
    pub timeout: Duration,
}

impl Config {
    /// Create a configuration with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `TETHER_BACKEND_URL` is required; `TETHER_TIMEOUT_SECS` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            env::var("TETHER_BACKEND_URL").map_err(|_| ConfigError::MissingBackendUrl)?;

        let timeout = match env::var("TETHER_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| ConfigError::InvalidTimeout)?),
            Err(_) => Duration::from_secs(30),
        };

        Ok(Self { base_url, timeout })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TETHER_BACKEND_URL environment variable is required")]
    MissingBackendUrl,

    #[error("Invalid TETHER_TIMEOUT_SECS value")]
    InvalidTimeout,
}

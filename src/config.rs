use crate::error::{A2aError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    /// Maximum |now - credential timestamp| accepted, in milliseconds.
    pub max_timestamp_skew_ms: i64,
    /// Accept authentication without any ownership verifier configured.
    /// Development and test builds only; never ship with this set.
    pub insecure_allow_unverified: bool,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct DirectoryConfig {
    /// Base URL of the federated discovery service; empty disables it.
    pub endpoint: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct PaymentsConfig {
    /// Feature flag for the x402 settlement methods. Off by default;
    /// with the flag off those methods are indistinguishable from
    /// unknown methods.
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            max_timestamp_skew_ms: 5 * 60 * 1000,
            insecure_allow_unverified: false,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Some("json".to_string()),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| A2aError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| A2aError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;

        if let Ok(endpoint) = std::env::var("A2A_DIRECTORY_ENDPOINT") {
            config.directory.endpoint = endpoint;
        }

        if let Ok(enabled) = std::env::var("A2A_PAYMENTS_ENABLED") {
            config.payments.enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.session_ttl_hours <= 0 {
            return Err(A2aError::Config(
                "Session TTL must be positive".to_string(),
            ));
        }

        if self.auth.max_timestamp_skew_ms <= 0 {
            return Err(A2aError::Config(
                "Timestamp skew window must be positive".to_string(),
            ));
        }

        if self.directory.timeout_seconds == 0 {
            return Err(A2aError::Config(
                "Directory timeout cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_directory_configured(&self) -> bool {
        !self.directory.endpoint.is_empty()
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. Safe to call more than once;
    /// later calls are no-ops.
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.clone()));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = if self.format.as_deref() == Some("json") {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }
}

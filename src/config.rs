use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::ws::socket::ConnTiming;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Origin allowed to open connections
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Shared secret for credential validation. Without it every connection
    /// is refused.
    pub jwt_secret: Option<String>,

    /// Database URL. Without it documents live in memory.
    pub db_url: Option<String>,

    /// Seconds without transport activity before a connection is dropped
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between server pings
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from `KEY=value` pairs. Inconsistent timing
    /// falls back to the default timing; every other value is kept as given.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        match envy::from_iter::<_, Config>(vars) {
            Ok(mut config) => {
                if let Err(e) = config.validate() {
                    warn!("{} - using default connection timing", e);
                    config.idle_timeout_secs = default_idle_timeout_secs();
                    config.ping_interval_secs = default_ping_interval_secs();
                }
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("IDLE_TIMEOUT_SECS must be positive".to_string()));
        }
        if self.ping_interval_secs == 0 || self.ping_interval_secs >= self.idle_timeout_secs {
            return Err(ConfigError::Invalid(
                "PING_INTERVAL_SECS must be positive and shorter than IDLE_TIMEOUT_SECS".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn conn_timing(&self) -> ConnTiming {
        ConnTiming {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origin: default_cors_origin(),
            jwt_secret: None,
            db_url: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_address(), "0.0.0.0:3001");
        assert!(config.is_development());
        assert_eq!(config.conn_timing().idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn ping_must_be_shorter_than_idle_timeout() {
        let config = Config {
            idle_timeout_secs: 10,
            ping_interval_secs: 10,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn bad_timing_keeps_store_and_secret() {
        let config = Config::from_vars(vars(&[
            ("DB_URL", "postgres://lab@db/notes"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "4000"),
            ("IDLE_TIMEOUT_SECS", "5"),
            ("PING_INTERVAL_SECS", "10"),
        ]))
        .unwrap();

        assert_eq!(config.db_url.as_deref(), Some("postgres://lab@db/notes"));
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.ping_interval_secs, 25);
    }

    #[test]
    fn unparsable_values_are_an_error() {
        let result = Config::from_vars(vars(&[("PORT", "not-a-port"), ("DB_URL", "postgres://lab@db/notes")]));
        assert!(matches!(result, Err(ConfigError::EnvError(_))));
    }
}

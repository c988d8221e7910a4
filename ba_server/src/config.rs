//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use blood_analyzer::{
    auth::{
        AuthConfig,
        config::{
            DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_MAGIC_LINK_TTL_SECS,
            DEFAULT_REFRESH_TOKEN_TTL_SECS,
        },
    },
    db::DatabaseConfig,
};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Secrets, token lifetimes and magic-link settings
    pub auth: AuthConfig,
    /// How often expired magic links are swept
    pub magic_link_sweep_interval: Duration,
    /// Prometheus exporter address; metrics are off when unset
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or unparsable
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_addr("SERVER_BIND", DEFAULT_BIND)?,
        };

        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            database_url: database_url_override
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .unwrap_or(defaults.database_url),
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            connection_timeout_secs: parse_env_or(
                "DB_CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            ),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs),
        };

        let auth = AuthConfig {
            access_token_secret: require("JWT_SECRET", "Generate with: openssl rand -hex 32")?,
            refresh_token_secret: require(
                "JWT_REFRESH_SECRET",
                "Generate with: openssl rand -hex 32 (must differ from JWT_SECRET)",
            )?,
            access_token_ttl_secs: parse_env_or(
                "JWT_EXPIRES_IN_SECONDS",
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
            ),
            refresh_token_ttl_secs: parse_env_or(
                "JWT_REFRESH_EXPIRES_IN_SECONDS",
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
            ),
            leeway_secs: parse_env_or("JWT_LEEWAY_SECONDS", 0),
            magic_link_ttl_secs: parse_env_or(
                "MAGIC_LINK_EXPIRY_SECONDS",
                DEFAULT_MAGIC_LINK_TTL_SECS,
            ),
            backend_url: require("BACKEND_URL", "Public base URL, e.g. https://api.example.com")?,
            email_from: require("EMAIL_FROM", "Sender address for magic-link emails")?,
            password_pepper: require("PASSWORD_PEPPER", "Generate with: openssl rand -hex 16")?,
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Not a socket address: {raw}"),
            })?),
            Err(_) => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            auth,
            magic_link_sweep_interval: Duration::from_secs(parse_env_or(
                "MAGIC_LINK_SWEEP_SECS",
                300,
            )),
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let auth = &self.auth;

        if auth.access_token_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if auth.refresh_token_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if auth.refresh_token_secret == auth.access_token_secret {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_SECRET".to_string(),
                reason: "Must differ from JWT_SECRET".to_string(),
            });
        }

        if auth.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        for (var, ttl) in [
            ("JWT_EXPIRES_IN_SECONDS", auth.access_token_ttl_secs),
            ("JWT_REFRESH_EXPIRES_IN_SECONDS", auth.refresh_token_ttl_secs),
            ("MAGIC_LINK_EXPIRY_SECONDS", auth.magic_link_ttl_secs),
        ] {
            if ttl <= 0 {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        if auth.refresh_token_ttl_secs <= auth.access_token_ttl_secs {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_EXPIRES_IN_SECONDS".to_string(),
                reason: format!(
                    "Must be greater than access token lifetime ({})",
                    auth.access_token_ttl_secs
                ),
            });
        }

        if self.magic_link_sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "MAGIC_LINK_SWEEP_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn require(key: &str, hint: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            var: key.to_string(),
            hint: hint.to_string(),
        })
}

fn parse_addr(key: &str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("Not a socket address: {raw}"),
    })
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        let mut auth = AuthConfig::new("a".repeat(32), "b".repeat(32));
        auth.password_pepper = "p".repeat(16);
        auth.backend_url = "http://localhost:8080".to_string();
        auth.email_from = "noreply@example.com".to_string();

        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            database: DatabaseConfig::new("test"),
            auth,
            magic_link_sweep_interval: Duration::from_secs(300),
            metrics_bind: None,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = valid_config();
        config.auth.access_token_secret = "short".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { var, .. }) if var == "JWT_SECRET"
        ));
    }

    #[test]
    fn test_shared_secret_rejected() {
        let mut config = valid_config();
        config.auth.refresh_token_secret = config.auth.access_token_secret.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { var, .. }) if var == "JWT_REFRESH_SECRET"
        ));
    }

    #[test]
    fn test_short_pepper_rejected() {
        let mut config = valid_config();
        config.auth.password_pepper = "pepper".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = valid_config();
        config.auth.magic_link_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { var, .. }) if var == "MAGIC_LINK_EXPIRY_SECONDS"
        ));
    }

    #[test]
    fn test_refresh_must_outlive_access() {
        let mut config = valid_config();
        config.auth.refresh_token_ttl_secs = config.auth.access_token_ttl_secs;
        assert!(config.validate().is_err());
    }
}

//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Base URL audience members open shared links against
    /// (e.g., "https://setlive.example.com")
    pub public_base_url: String,
}

impl ServerConfig {
    /// Get the shareable URL for a public setlist token
    ///
    /// # Returns
    /// Full URL like "https://setlive.example.com/public/{token}"
    pub fn public_link_url(&self, token: &str) -> String {
        format!(
            "{}/public/{}",
            self.public_base_url.trim_end_matches('/'),
            token
        )
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
}

/// Audience request rate limiting
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Cooldown between accepted requests from one requester (seconds)
    pub short_window_seconds: u64,
    /// Rolling counter window (seconds)
    pub long_window_seconds: u64,
    /// Maximum requests per requester inside the long window
    pub long_max_requests: u32,
    /// Upper bound on tracked (setlist, requester) keys per window store
    pub max_tracked_keys: usize,
}

/// External track catalog integration (playlist import)
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Client-credentials id; empty disables the integration
    pub client_id: String,
    pub client_secret: String,
    /// OAuth token endpoint
    pub token_url: String,
    /// REST API base (no trailing slash)
    pub api_base: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

impl CatalogConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SETLIVE_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.public_base_url", "http://localhost:8080")?
            .set_default("database.path", "data/setlive.db")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("rate_limit.short_window_seconds", 15)?
            .set_default("rate_limit.long_window_seconds", 600)?
            .set_default("rate_limit.long_max_requests", 20)?
            .set_default("rate_limit.max_tracked_keys", 10000)?
            .set_default("catalog.client_id", "")?
            .set_default("catalog.client_secret", "")?
            .set_default("catalog.token_url", "https://accounts.spotify.com/api/token")?
            .set_default("catalog.api_base", "https://api.spotify.com/v1")?
            .set_default("catalog.timeout_seconds", 20)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (SETLIVE_*)
            .add_source(
                Environment::with_prefix("SETLIVE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.short_window_seconds == 0
            || self.rate_limit.long_window_seconds == 0
            || self.rate_limit.long_max_requests == 0
        {
            return Err(crate::error::AppError::Config(
                "rate_limit windows and request cap must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.max_tracked_keys == 0 {
            return Err(crate::error::AppError::Config(
                "rate_limit.max_tracked_keys must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.server.public_base_url).is_err() {
            return Err(crate::error::AppError::Config(
                "server.public_base_url must be a valid URL".to_string(),
            ));
        }

        if self.catalog.timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "catalog.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                public_base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/setlive-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
            },
            rate_limit: RateLimitConfig {
                short_window_seconds: 15,
                long_window_seconds: 600,
                long_max_requests: 20,
                max_tracked_keys: 10_000,
            },
            catalog: CatalogConfig {
                client_id: String::new(),
                client_secret: String::new(),
                token_url: "https://accounts.spotify.com/api/token".to_string(),
                api_base: "https://api.spotify.com/v1".to_string(),
                timeout_seconds: 20,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_zero_rate_limit_window() {
        let mut config = valid_config();
        config.rate_limit.short_window_seconds = 0;

        let error = config
            .validate()
            .expect_err("zero-length windows must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("rate_limit")
        ));
    }

    #[test]
    fn validate_rejects_invalid_public_base_url() {
        let mut config = valid_config();
        config.server.public_base_url = "not a url".to_string();

        let error = config
            .validate()
            .expect_err("unparseable base URL must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("public_base_url")
        ));
    }

    #[test]
    fn public_link_url_joins_without_double_slash() {
        let mut config = valid_config();
        config.server.public_base_url = "https://setlive.example.com/".to_string();

        assert_eq!(
            config.server.public_link_url("abc123"),
            "https://setlive.example.com/public/abc123"
        );
    }
}

//! Configuration shared by both binaries (`qtask-server` and `qtask-worker`).
//!
//! Loaded entirely from environment variables per spec §6; callers should
//! run `dotenvy::dotenv().ok()` before [`AppConfig::from_env`] so a local
//! `.env` file can supply these in development, mirroring
//! `api/config.py`'s `env_file = ".env"` in the original implementation.

/// Environment-driven configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string (`DATABASE_URL`).
    pub database_url: String,
    /// RabbitMQ connection string (`RABBITMQ_URL`).
    pub rabbitmq_url: String,
    /// HTTP listen port (`PORT`), only read by `qtask-server`.
    pub port: u16,
    /// `tracing` log level / `EnvFilter` directive (`LOG_LEVEL`).
    pub log_level: String,
    /// `development` enables pretty console logs; anything else is JSON.
    pub environment: String,
    /// Comma-separated list of allowed CORS origins, or `*` (`CORS_ORIGINS`).
    pub cors_origins: String,
}

/// Error loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
#[error("missing required environment variable: {0}")]
pub struct ConfigError(pub String);

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require_env("DATABASE_URL")?,
            rabbitmq_url: require_env("RABBITMQ_URL")?,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            cors_origins: std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),
        })
    }

    /// Whether the process should emit pretty console logs rather than JSON.
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// The configured origins, or `None` for the permissive `*` wildcard.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        if self.cors_origins.trim() == "*" {
            None
        } else {
            Some(
                self.cors_origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )
        }
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError(key.to_string()))
}

use std::env;
use std::time::Duration;

use crate::models::RateLimitPreset;
use crate::services::http_client::RetryPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub retry: RetryPolicy,
    pub upload: UploadConfig,
    pub progress: ProgressConfig,
    /// Preset used when a fetch request carries neither a config nor a preset name
    pub default_preset: RateLimitPreset,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Upstream prayer-times API
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub country: String,
    /// Calculation method id understood by the upstream API
    pub method: u32,
    /// Hard timeout for a single HTTP attempt
    pub request_timeout: Duration,
}

/// Batch upload tuning
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub batch_size: usize,
    /// Attempts per row once a batch transaction has failed
    pub max_row_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_multiplier: f64,
}

/// Progress hub retention
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// How long a finished operation stays readable before it is purged
    pub retention: Duration,
    pub reap_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_preset = match env::var("DEFAULT_RATE_LIMIT_PRESET") {
            Ok(name) => name
                .parse()
                .map_err(|_| ConfigError::UnknownPreset(name))?,
            Err(_) => RateLimitPreset::Balanced,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database: DatabaseConfig::from_env()?,
            upstream: UpstreamConfig::from_env()?,
            retry: retry_policy_from_env(),
            upload: UploadConfig::from_env(),
            progress: ProgressConfig::from_env(),
            default_preset,
        })
    }
}

/// Reads a variable and parses it, falling back to `default` when unset or malformed
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)),
            idle_timeout: Duration::from_secs(env_or("DATABASE_IDLE_TIMEOUT_SECS", 600)),
            max_lifetime: Duration::from_secs(env_or("DATABASE_MAX_LIFETIME_SECS", 1800)),
        })
    }
}

impl UpstreamConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| "https://api.aladhan.com/v1".to_string());

        let parsed = url::Url::parse(&base_url)
            .map_err(|_| ConfigError::InvalidUpstreamUrl(base_url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidUpstreamUrl(base_url));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            country: env::var("UPSTREAM_COUNTRY").unwrap_or_else(|_| "Bangladesh".to_string()),
            method: env_or("UPSTREAM_METHOD", 1),
            request_timeout: Duration::from_secs(env_or("UPSTREAM_TIMEOUT_SECS", 15)),
        })
    }
}

/// Retry policy for upstream calls; the retryable status set is fixed
pub fn retry_policy_from_env() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    RetryPolicy {
        max_retries: env_or("UPSTREAM_MAX_RETRIES", defaults.max_retries),
        initial_delay: Duration::from_millis(env_or(
            "UPSTREAM_INITIAL_DELAY_MS",
            defaults.initial_delay.as_millis() as u64,
        )),
        max_delay: Duration::from_millis(env_or(
            "UPSTREAM_MAX_DELAY_MS",
            defaults.max_delay.as_millis() as u64,
        )),
        backoff_multiplier: env_or("UPSTREAM_BACKOFF_MULTIPLIER", defaults.backoff_multiplier),
        retryable_statuses: defaults.retryable_statuses,
    }
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_or("UPLOAD_BATCH_SIZE", defaults.batch_size).max(1),
            max_row_attempts: env_or("UPLOAD_MAX_ROW_ATTEMPTS", defaults.max_row_attempts).max(1),
            retry_base_delay: Duration::from_millis(env_or(
                "UPLOAD_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )),
            retry_multiplier: env_or("UPLOAD_RETRY_MULTIPLIER", defaults.retry_multiplier),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_row_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_multiplier: 2.0,
        }
    }
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        Self {
            retention: Duration::from_secs(env_or("PROGRESS_RETENTION_SECS", 300)),
            reap_interval: Duration::from_secs(env_or("PROGRESS_REAP_INTERVAL_SECS", 60)),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    MissingDatabaseUrl,
    InvalidUpstreamUrl(String),
    UnknownPreset(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
            ConfigError::InvalidUpstreamUrl(url) => {
                write!(f, "UPSTREAM_BASE_URL must be an http(s) URL, got '{}'", url)
            }
            ConfigError::UnknownPreset(name) => {
                write!(f, "DEFAULT_RATE_LIMIT_PRESET '{}' is not a known preset", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

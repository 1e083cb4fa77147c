//! Runtime configuration for the background jobs.
//!
//! Values come from environment variables with sensible defaults. Builder
//! methods override individual fields, mostly for tests and the CLI.

use std::time::Duration;

use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::scheduler::link_health::{DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_PROBE_TIMEOUT};
use crate::scheduler::view_count_flush::DEFAULT_SCAN_COUNT;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration shared by the jobs and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// PostgreSQL connection URL. Only needed for the PostgreSQL store.
    pub database_url: Option<String>,
    /// Redis connection URL.
    pub redis_url: String,
    /// Leading segment of every cache key.
    pub cache_namespace: String,
    /// Expiry applied by `Expiry::Default`.
    pub cache_default_ttl: Duration,
    /// Upper bound of the database pool.
    pub db_max_connections: u32,
    /// `SCAN` count hint for the view-count flush.
    pub view_flush_scan_count: usize,
    /// Simultaneous link probes.
    pub link_probe_concurrency: usize,
    /// Deadline for one link probe.
    pub link_probe_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: "redis://localhost:6379".to_string(),
            cache_namespace: "blog".to_string(),
            cache_default_ttl: DEFAULT_TTL,
            db_max_connections: 10,
            view_flush_scan_count: DEFAULT_SCAN_COUNT,
            link_probe_concurrency: DEFAULT_MAX_CONCURRENT_PROBES,
            link_probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection URL (optional)
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
    /// - `BLOG_CACHE_NAMESPACE`: Cache key namespace (default: blog)
    /// - `BLOG_CACHE_DEFAULT_TTL_SECS`: Default cache expiry (default: 300)
    /// - `BLOG_DB_MAX_CONNECTIONS`: Database pool size (default: 10)
    /// - `BLOG_VIEW_FLUSH_SCAN_COUNT`: SCAN count hint (default: 100)
    /// - `BLOG_LINK_PROBE_CONCURRENCY`: Simultaneous link probes (default: 10)
    /// - `BLOG_LINK_PROBE_TIMEOUT_SECS`: Link probe timeout (default: 5)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("DATABASE_URL") {
            config.database_url = Some(val);
        }

        if let Some(val) = lookup("REDIS_URL") {
            config.redis_url = val;
        }

        if let Some(val) = lookup("BLOG_CACHE_NAMESPACE") {
            config.cache_namespace = val;
        }

        if let Some(val) = lookup("BLOG_CACHE_DEFAULT_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "BLOG_CACHE_DEFAULT_TTL_SECS")?;
            config.cache_default_ttl = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("BLOG_DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_env_value(&val, "BLOG_DB_MAX_CONNECTIONS")?;
        }

        if let Some(val) = lookup("BLOG_VIEW_FLUSH_SCAN_COUNT") {
            config.view_flush_scan_count = parse_env_value(&val, "BLOG_VIEW_FLUSH_SCAN_COUNT")?;
        }

        if let Some(val) = lookup("BLOG_LINK_PROBE_CONCURRENCY") {
            config.link_probe_concurrency = parse_env_value(&val, "BLOG_LINK_PROBE_CONCURRENCY")?;
        }

        if let Some(val) = lookup("BLOG_LINK_PROBE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "BLOG_LINK_PROBE_TIMEOUT_SECS")?;
            config.link_probe_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.database_url {
            if url.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "database_url cannot be empty".to_string(),
                ));
            }
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.cache_namespace.is_empty() || self.cache_namespace.contains(':') {
            return Err(ConfigError::ValidationFailed(
                "cache_namespace must be non-empty and must not contain ':'".to_string(),
            ));
        }

        if self.cache_default_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "cache_default_ttl must be greater than 0".to_string(),
            ));
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "db_max_connections must be greater than 0".to_string(),
            ));
        }

        if self.view_flush_scan_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "view_flush_scan_count must be greater than 0".to_string(),
            ));
        }

        if self.link_probe_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "link_probe_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.link_probe_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "link_probe_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The database URL, or an error naming the variable to set.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }

    /// Builder method to set the cache namespace.
    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }

    /// Builder method to set the probe concurrency.
    pub fn with_link_probe_concurrency(mut self, concurrency: usize) -> Self {
        self.link_probe_concurrency = concurrency;
        self
    }
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database_url, None);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.cache_namespace, "blog");
        assert_eq!(config.cache_default_ttl, Duration::from_secs(300));
        assert_eq!(config.view_flush_scan_count, 100);
        assert_eq!(config.link_probe_concurrency, 10);
        assert_eq!(config.link_probe_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/blog"),
            ("BLOG_CACHE_NAMESPACE", "staging"),
            ("BLOG_LINK_PROBE_CONCURRENCY", " 4 "),
            ("BLOG_LINK_PROBE_TIMEOUT_SECS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/blog");
        assert_eq!(config.cache_namespace, "staging");
        assert_eq!(config.link_probe_concurrency, 4);
        assert_eq!(config.link_probe_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let err = AppConfig::from_lookup(lookup(&[("BLOG_VIEW_FLUSH_SCAN_COUNT", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BLOG_VIEW_FLUSH_SCAN_COUNT"));
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let config = AppConfig::new().with_link_probe_concurrency(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validation_rejects_namespace_with_colon() {
        let config = AppConfig::new().with_cache_namespace("blog:prod");
        assert!(config.validate().is_err());

        let config = AppConfig::new().with_cache_namespace("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_database_url_missing() {
        let config = AppConfig::new();
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "BLOG_DB_MAX_CONNECTIONS".to_string(),
            message: "invalid digit".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for BLOG_DB_MAX_CONNECTIONS: invalid digit"
        );
    }
}

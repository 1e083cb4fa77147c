//! Key-value cache used as the write-back buffer for view counters.
//!
//! The background jobs only depend on the [`CacheClient`] trait:
//!
//! - **RedisCache**: production backend over a Redis connection manager
//! - **MemoryCache**: in-process backend with the same scan/pop semantics,
//!   used for local runs and tests
//!
//! # Correctness
//!
//! The flush job takes no lock over the key space. Request handlers keep
//! calling [`CacheClient::incr`] while a pass scans and pops, so the only
//! guarantees that matter are:
//!
//! - `incr` is atomic and creates the key at 1
//! - `pop_batch` never returns a value without deleting its key, and never
//!   deletes a key without returning the value it removed

pub mod keys;
pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::keys::ViewCountKeys;
pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Expiry applied when none is given explicitly.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to connect to the cache server.
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis command failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Key is absent and the caller required it.
    #[error("Cache miss for key '{0}'")]
    Miss(String),

    /// Increment applied to a value that is not an integer.
    #[error("Value at '{0}' is not an integer")]
    NotAnInteger(String),

    /// Scan pattern could not be compiled.
    #[error("Invalid scan pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Expiry policy for [`CacheClient::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// The backend's default expiry (five minutes unless configured).
    #[default]
    Default,
    /// Keep the key until it is deleted.
    Never,
    /// Expire after the given duration.
    After(Duration),
}

impl Expiry {
    /// Resolves the policy against a backend default. `None` means no expiry.
    pub fn resolve(self, default_ttl: Duration) -> Option<Duration> {
        match self {
            Expiry::Default => Some(default_ttl),
            Expiry::Never => None,
            Expiry::After(ttl) if ttl.is_zero() => Some(default_ttl),
            Expiry::After(ttl) => Some(ttl),
        }
    }
}

/// Contract the write-back jobs require from a cache backend.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Plain lookup; a miss is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value with the given expiry policy.
    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), CacheError>;

    /// Removes a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically increments an integer counter, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// One page of a cursor-based scan over keys matching a glob pattern.
    ///
    /// Start with cursor `0`; a returned cursor of `0` ends the enumeration.
    /// Pages may be empty while the cursor is still non-zero.
    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(Vec<String>, u64), CacheError>;

    /// Reads and deletes every key in one round trip.
    ///
    /// Keys that no longer exist are omitted from the result.
    async fn pop_batch(&self, keys: &[String]) -> Result<HashMap<String, String>, CacheError>;

    /// Like [`CacheClient::get`], but a miss is [`CacheError::Miss`].
    async fn get_required(&self, key: &str) -> Result<String, CacheError> {
        self.get(key)
            .await?
            .ok_or_else(|| CacheError::Miss(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_resolve() {
        let default = Duration::from_secs(300);
        assert_eq!(Expiry::Default.resolve(default), Some(default));
        assert_eq!(Expiry::Never.resolve(default), None);
        assert_eq!(
            Expiry::After(Duration::from_secs(10)).resolve(default),
            Some(Duration::from_secs(10))
        );
        assert_eq!(Expiry::After(Duration::ZERO).resolve(default), Some(default));
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::Miss("blog:post:view_count:1".to_string());
        assert!(err.to_string().contains("blog:post:view_count:1"));

        let err = CacheError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = CacheError::NotAnInteger("k".to_string());
        assert!(err.to_string().contains("not an integer"));
    }

    #[tokio::test]
    async fn test_get_required_miss() {
        let cache = MemoryCache::new();
        let err = cache.get_required("absent").await.unwrap_err();
        assert!(matches!(err, CacheError::Miss(key) if key == "absent"));
    }
}

//! Redis-backed cache.
//!
//! Counters are plain Redis integers, so `INCR` gives the atomic increment.
//! A batch pop runs one Lua script over the whole page: every string key is
//! read and deleted in a single atomic step, and keys holding any other type
//! are left untouched instead of failing the batch.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::info;

use super::{CacheClient, CacheError, Expiry, DEFAULT_TTL};

/// Time allowed for the startup `PING`.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET` + `DEL` per key. Missing and non-string keys come back as nil.
const POP_BATCH_SCRIPT: &str = r#"
local out = {}
for i, key in ipairs(KEYS) do
    local value = redis.pcall('GET', key)
    if type(value) == 'string' then
        redis.call('DEL', key)
        out[i] = value
    else
        out[i] = false
    end
end
return out
"#;

/// Redis implementation of [`CacheClient`].
#[derive(Clone)]
pub struct RedisCache {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Expiry used for [`Expiry::Default`].
    default_ttl: Duration,
    pop_script: Script,
}

impl RedisCache {
    /// Connects to Redis and verifies the server answers a `PING`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection or the ping fails.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        let mut redis = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        let ping = redis::cmd("PING");
        match tokio::time::timeout(CONNECT_TIMEOUT, ping.query_async::<_, String>(&mut redis)).await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(CacheError::ConnectionFailed(e.to_string())),
            Err(_) => {
                return Err(CacheError::ConnectionFailed(format!(
                    "PING timed out after {:?}",
                    CONNECT_TIMEOUT
                )))
            }
        }

        info!(url = %redis_url, "Connected to Redis");
        Ok(Self::from_connection(redis))
    }

    /// Wraps an existing connection manager.
    ///
    /// Useful when sharing a connection pool across multiple components.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            default_ttl: DEFAULT_TTL,
            pop_script: Script::new(POP_BATCH_SCRIPT),
        }
    }

    /// Overrides the expiry used for [`Expiry::Default`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = expiry.resolve(self.default_ttl) {
            // PX keeps sub-second expiries exact.
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.redis.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(Vec<String>, u64), CacheError> {
        let mut conn = self.redis.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok((keys, next))
    }

    async fn pop_batch(&self, keys: &[String]) -> Result<HashMap<String, String>, CacheError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.redis.clone();

        let mut invocation = self.pop_script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        let values: Vec<Option<String>> = invocation.invoke_async(&mut conn).await?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Live-server checks. Run with: REDIS_URL=redis://localhost:6379 cargo test -- --ignored
    fn test_redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let result = RedisCache::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(CacheError::ConnectionFailed(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_incr_and_pop_batch_live() {
        let cache = RedisCache::connect(&test_redis_url())
            .await
            .expect("redis should be reachable");
        let key = "blog_server_test:post:view_count:1".to_string();
        cache.delete(&key).await.expect("delete");

        assert_eq!(cache.incr(&key).await.expect("incr"), 1);
        assert_eq!(cache.incr(&key).await.expect("incr"), 2);

        let popped = cache
            .pop_batch(&[key.clone(), "blog_server_test:missing".to_string()])
            .await
            .expect("pop");
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[&key], "2");
        assert_eq!(cache.get(&key).await.expect("get"), None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_pop_batch_leaves_non_string_keys_live() {
        let cache = RedisCache::connect(&test_redis_url())
            .await
            .expect("redis should be reachable");
        let counter = "blog_server_wrongtype:post:view_count:1".to_string();
        let hash = "blog_server_wrongtype:post:view_count:2".to_string();
        cache.delete(&counter).await.expect("delete");
        cache.delete(&hash).await.expect("delete");

        cache.set(&counter, "5", Expiry::Never).await.expect("set");
        let mut conn = cache.redis.clone();
        conn.hset::<_, _, _, ()>(&hash, "f", "v").await.expect("hset");

        let popped = cache
            .pop_batch(&[counter.clone(), hash.clone()])
            .await
            .expect("pop");
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[&counter], "5");
        assert_eq!(cache.get(&counter).await.expect("get"), None);

        let still_there: bool = conn.exists(&hash).await.expect("exists");
        assert!(still_there);
        cache.delete(&hash).await.expect("cleanup");
    }

    #[tokio::test]
    #[ignore]
    async fn test_scan_live() {
        let cache = RedisCache::connect(&test_redis_url())
            .await
            .expect("redis should be reachable");
        for id in 1..=5 {
            cache
                .incr(&format!("blog_server_scan:post:view_count:{id}"))
                .await
                .expect("incr");
        }

        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let (keys, next) = cache
                .scan("blog_server_scan:post:view_count:*", cursor, 2)
                .await
                .expect("scan");
            found.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        found.sort();
        found.dedup();
        assert_eq!(found.len(), 5);
        cache.pop_batch(&found).await.expect("cleanup");
    }
}

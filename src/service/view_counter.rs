//! Post read-path hook for view counting.
//!
//! A post read bumps the post's counter in the cache and moves on; the
//! flush job later folds the counter into `posts.view_count`. The read path
//! never waits on, or fails because of, the cache.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, trace};

use crate::cache::{CacheClient, CacheError, ViewCountKeys};

/// Buffers post views in the cache.
#[derive(Clone)]
pub struct ViewCounter {
    cache: Arc<dyn CacheClient>,
    keys: ViewCountKeys,
}

impl ViewCounter {
    /// Creates a counter over the default `blog` namespace.
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self {
            cache,
            keys: ViewCountKeys::default(),
        }
    }

    /// Uses a different key namespace.
    pub fn with_keys(mut self, keys: ViewCountKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Records one view of `post_id` in the background.
    ///
    /// Failures are logged and never surfaced. The handle is only useful to
    /// callers that need to observe completion, such as tests.
    pub fn record_view(&self, post_id: i64) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let key = self.keys.key(post_id);

        tokio::spawn(async move {
            match cache.incr(&key).await {
                Ok(count) => trace!(post_id, count, "Recorded view"),
                Err(e) => error!(post_id, key = %key, error = %e, "Failed to record view"),
            }
        })
    }

    /// Views of `post_id` not yet flushed to the database.
    ///
    /// A missing or non-integer counter reads as zero.
    pub async fn pending_views(&self, post_id: i64) -> Result<i64, CacheError> {
        let value = self.cache.get(&self.keys.key(post_id)).await?;
        Ok(value
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Expiry, MemoryCache};

    #[tokio::test]
    async fn test_record_view_increments() {
        let cache = Arc::new(MemoryCache::new());
        let counter = ViewCounter::new(cache.clone());

        for _ in 0..3 {
            counter.record_view(7).await.unwrap();
        }

        assert_eq!(counter.pending_views(7).await.unwrap(), 3);
        assert_eq!(
            cache.get("blog:post:view_count:7").await.unwrap().as_deref(),
            Some("3")
        );
    }

    #[tokio::test]
    async fn test_concurrent_views_are_all_counted() {
        let cache = Arc::new(MemoryCache::new());
        let counter = ViewCounter::new(cache);

        let handles: Vec<_> = (0..200).map(|_| counter.record_view(1)).collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.pending_views(1).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_pending_views_defaults_to_zero() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set("blog:post:view_count:2", "garbage", Expiry::Never)
            .await
            .unwrap();
        let counter = ViewCounter::new(cache);

        assert_eq!(counter.pending_views(1).await.unwrap(), 0);
        assert_eq!(counter.pending_views(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_increment_is_swallowed() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set("blog:post:view_count:5", "not-a-number", Expiry::Never)
            .await
            .unwrap();
        let counter = ViewCounter::new(cache);

        // The task completes normally even though INCR fails.
        counter.record_view(5).await.unwrap();
        assert_eq!(counter.pending_views(5).await.unwrap(), 0);
    }
}

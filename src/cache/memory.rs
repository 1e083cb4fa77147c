//! In-process cache backend.
//!
//! Mirrors the parts of Redis semantics the write-back jobs rely on. Scan
//! cursors are creation sequence numbers rather than positions, so deleting
//! keys mid-scan never makes the scan skip keys that are still present.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;

use super::{CacheClient, CacheError, Expiry, DEFAULT_TTL};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Entry>,
    by_seq: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Store {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn insert(&mut self, key: &str, value: String, expires_at: Option<Instant>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        self.by_seq.insert(seq, key.to_string());
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                seq,
            },
        );
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let entry = self.entries.remove(key)?;
        self.by_seq.remove(&entry.seq);
        Some(entry.value)
    }
}

/// Thread-safe in-memory implementation of [`CacheClient`].
pub struct MemoryCache {
    store: Mutex<Store>,
    default_ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Creates an empty cache with the standard five minute default expiry.
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache with a custom default expiry.
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            default_ttl,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the cache holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // No method panics while holding the lock, so a poisoned store is
        // still consistent.
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Compiles a Redis-style glob (`*` and `?`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut store = self.lock();
        Ok(store.live(key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = expiry.resolve(self.default_ttl).map(|ttl| now + ttl);
        let mut store = self.lock();
        // Overwriting an expired key counts as a fresh key.
        store.live(key, now);
        store.insert(key, value.to_string(), expires_at);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut store = self.lock();
        match store.live(key, Instant::now()) {
            Some(entry) => {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))?;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                store.insert(key, "1".to_string(), None);
                Ok(1)
            }
        }
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(Vec<String>, u64), CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let mut store = self.lock();

        let page: Vec<(u64, String)> = store
            .by_seq
            .range(cursor.saturating_add(1)..)
            .take(count.max(1))
            .map(|(seq, key)| (*seq, key.clone()))
            .collect();

        let Some(&(last_seq, _)) = page.last() else {
            return Ok((Vec::new(), 0));
        };

        let mut keys = Vec::new();
        for (_, key) in page {
            if store.live(&key, now).is_some() && matcher.is_match(&key) {
                keys.push(key);
            }
        }

        let more = store.by_seq.range(last_seq + 1..).next().is_some();
        Ok((keys, if more { last_seq } else { 0 }))
    }

    async fn pop_batch(&self, keys: &[String]) -> Result<HashMap<String, String>, CacheError> {
        let now = Instant::now();
        let mut store = self.lock();
        let mut popped = HashMap::with_capacity(keys.len());
        for key in keys {
            if store.live(key, now).is_some() {
                if let Some(value) = store.remove(key) {
                    popped.insert(key.clone(), value);
                }
            }
        }
        Ok(popped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn scan_all(cache: &MemoryCache, pattern: &str, count: usize) -> Vec<String> {
        let mut cursor = 0;
        let mut all = Vec::new();
        loop {
            let (keys, next) = cache.scan(pattern, cursor, count).await.unwrap();
            all.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        all
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("blog:post:view_count:*").unwrap();
        assert!(re.is_match("blog:post:view_count:7"));
        assert!(!re.is_match("blog:post:other:7"));
        assert!(!re.is_match("xblog:post:view_count:7"));

        let re = glob_to_regex("a?c.d").unwrap();
        assert!(re.is_match("abc.d"));
        assert!(!re.is_match("abcxd"));
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v", Expiry::Never).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("short", "v", Expiry::After(Duration::from_millis(20)))
            .await
            .unwrap();
        cache.set("forever", "v", Expiry::Never).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("forever").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_incr_creates_and_increments() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("c").await.unwrap(), 1);
        assert_eq!(cache.incr("c").await.unwrap(), 2);
        assert_eq!(cache.get("c").await.unwrap(), Some("2".to_string()));

        cache.set("s", "abc", Expiry::Never).await.unwrap();
        assert!(matches!(
            cache.incr("s").await,
            Err(CacheError::NotAnInteger(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_incr_is_atomic() {
        let cache = Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    cache.incr("hot").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.get("hot").await.unwrap(), Some("1000".to_string()));
    }

    #[tokio::test]
    async fn test_scan_pages_and_pattern() {
        let cache = MemoryCache::new();
        for id in 1..=25 {
            cache.incr(&format!("blog:post:view_count:{id}")).await.unwrap();
        }
        cache.set("blog:session:1", "x", Expiry::Never).await.unwrap();

        let (first, cursor) = cache.scan("blog:post:view_count:*", 0, 10).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_ne!(cursor, 0);

        let all = scan_all(&cache, "blog:post:view_count:*", 10).await;
        assert_eq!(all.len(), 25);
        assert!(all.iter().all(|k| k.starts_with("blog:post:view_count:")));
    }

    #[tokio::test]
    async fn test_scan_empty_cache() {
        let cache = MemoryCache::new();
        let (keys, cursor) = cache.scan("*", 0, 100).await.unwrap();
        assert!(keys.is_empty());
        assert_eq!(cursor, 0);
    }

    #[tokio::test]
    async fn test_scan_is_stable_when_keys_are_popped() {
        let cache = MemoryCache::new();
        for id in 1..=30 {
            cache.incr(&format!("blog:post:view_count:{id}")).await.unwrap();
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (keys, next) = cache.scan("blog:post:view_count:*", cursor, 7).await.unwrap();
            let popped = cache.pop_batch(&keys).await.unwrap();
            seen.extend(popped.into_keys());
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 30);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_pop_batch_omits_missing_keys() {
        let cache = MemoryCache::new();
        cache.incr("a").await.unwrap();
        cache.incr("a").await.unwrap();
        cache.incr("b").await.unwrap();

        let popped = cache
            .pop_batch(&["a".to_string(), "b".to_string(), "gone".to_string()])
            .await
            .unwrap();

        assert_eq!(popped.len(), 2);
        assert_eq!(popped["a"], "2");
        assert_eq!(popped["b"], "1");
        assert!(cache.is_empty());

        let again = cache.pop_batch(&["a".to_string()]).await.unwrap();
        assert!(again.is_empty());
    }
}

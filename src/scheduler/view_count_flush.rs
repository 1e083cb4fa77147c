//! View-count write-back.
//!
//! Post reads increment a per-post counter in the cache. Each pass walks the
//! counter keyspace with a cursor scan, atomically pops every page it finds,
//! sums the popped counts per post and adds them to `posts.view_count` with a
//! single batched statement.
//!
//! Because a counter is read and deleted in one step, an increment that lands
//! after the pop simply recreates the key at 1 and is picked up next pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::job::{JobError, PassError, PassReport, PeriodicJob};
use crate::cache::{CacheClient, ViewCountKeys};
use crate::metrics::MetricsCollector;
use crate::storage::PostStore;

/// Job name used in logs and metrics.
pub const VIEW_COUNT_FLUSH: &str = "view_count_flush";

/// Default page size hint for each `SCAN`.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Flushes buffered view counters into the posts table.
pub struct ViewCountFlushJob {
    cache: Arc<dyn CacheClient>,
    posts: Arc<dyn PostStore>,
    keys: ViewCountKeys,
    scan_count: usize,
    metrics: MetricsCollector,
}

impl ViewCountFlushJob {
    /// Creates a job over the default `blog` key namespace.
    pub fn new(cache: Arc<dyn CacheClient>, posts: Arc<dyn PostStore>) -> Self {
        Self {
            cache,
            posts,
            keys: ViewCountKeys::default(),
            scan_count: DEFAULT_SCAN_COUNT,
            metrics: MetricsCollector::new(),
        }
    }

    /// Uses a different key namespace.
    pub fn with_keys(mut self, keys: ViewCountKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Sets the `SCAN` count hint.
    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count.max(1);
        self
    }

    /// Folds one popped page into `updates`, counting malformed entries.
    fn accumulate(
        &self,
        popped: HashMap<String, String>,
        updates: &mut BTreeMap<i64, i64>,
        report: &mut PassReport,
    ) {
        for (key, value) in popped {
            report.examined += 1;

            let Some(post_id) = ViewCountKeys::parse_post_id(&key) else {
                warn!(job = VIEW_COUNT_FLUSH, key = %key, "Skipping counter with malformed key");
                report.skipped += 1;
                continue;
            };

            let count = match value.trim().parse::<i64>() {
                Ok(count) if count > 0 => count,
                Ok(count) => {
                    warn!(job = VIEW_COUNT_FLUSH, post_id, count, "Skipping non-positive counter");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        job = VIEW_COUNT_FLUSH,
                        post_id,
                        value = %value,
                        error = %e,
                        "Skipping counter with non-integer value"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            let total = updates.entry(post_id).or_insert(0);
            match total.checked_add(count) {
                Some(sum) => *total = sum,
                None => {
                    warn!(
                        job = VIEW_COUNT_FLUSH,
                        post_id,
                        count,
                        pending = *total,
                        "Skipping counter that overflows the pending delta"
                    );
                    report.skipped += 1;
                }
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for ViewCountFlushJob {
    fn name(&self) -> &'static str {
        VIEW_COUNT_FLUSH
    }

    async fn run_pass(&self) -> Result<PassReport, PassError> {
        let started = Instant::now();
        let mut report = PassReport::new(VIEW_COUNT_FLUSH);
        let mut errors: Vec<JobError> = Vec::new();
        let mut updates: BTreeMap<i64, i64> = BTreeMap::new();

        let pattern = self.keys.pattern();
        let mut cursor = 0u64;

        loop {
            let (keys, next) = match self.cache.scan(&pattern, cursor, self.scan_count).await {
                Ok(page) => page,
                Err(e) => {
                    error!(job = VIEW_COUNT_FLUSH, cursor, error = %e, "Counter scan failed");
                    errors.push(e.into());
                    break;
                }
            };
            cursor = next;

            if !keys.is_empty() {
                match self.cache.pop_batch(&keys).await {
                    Ok(popped) => self.accumulate(popped, &mut updates, &mut report),
                    Err(e) => {
                        error!(
                            job = VIEW_COUNT_FLUSH,
                            keys = keys.len(),
                            error = %e,
                            "Counter pop failed"
                        );
                        errors.push(e.into());
                        break;
                    }
                }
            }

            if cursor == 0 {
                break;
            }
        }

        if updates.is_empty() {
            debug!(job = VIEW_COUNT_FLUSH, "No buffered views to flush");
        } else {
            let views = updates
                .values()
                .fold(0i64, |acc, delta| acc.saturating_add(*delta));
            report.writes = 1;
            match self.posts.apply_view_count_deltas(&updates).await {
                Ok(rows) => {
                    report.applied = updates.len();
                    self.metrics.record_views_flushed(views);
                    info!(
                        job = VIEW_COUNT_FLUSH,
                        posts = updates.len(),
                        rows,
                        views,
                        "Flushed view counts"
                    );
                }
                Err(e) => {
                    // The counters are already gone from the cache.
                    error!(
                        job = VIEW_COUNT_FLUSH,
                        posts = updates.len(),
                        views,
                        error = %e,
                        "View count write failed; popped views dropped"
                    );
                    errors.push(e.into());
                }
            }
        }

        report.duration = started.elapsed();
        PassError::check(report, errors)
    }
}

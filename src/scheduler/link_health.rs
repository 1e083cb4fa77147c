//! Link health check.
//!
//! Each pass probes every link concurrently, at most `max_concurrent_probes`
//! at a time, and writes back only the links whose status changed, in one
//! batched statement. Every probe future owns its result; the results are
//! merged after the join barrier.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::job::{JobError, PassError, PassReport, PeriodicJob};
use crate::entity::{Link, LinkStatus};
use crate::metrics::MetricsCollector;
use crate::probe::HttpProber;
use crate::storage::LinkStore;

/// Job name used in logs and metrics.
pub const LINK_HEALTH_CHECK: &str = "link_health_check";

/// Default cap on simultaneous probes.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 10;

/// Default per-probe deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of checking one link.
#[derive(Debug, Clone, Copy)]
struct LinkCheck {
    id: i64,
    previous: LinkStatus,
    observed: LinkStatus,
    probed: bool,
}

impl LinkCheck {
    fn change(&self) -> Option<(i64, LinkStatus)> {
        (self.observed != self.previous).then_some((self.id, self.observed))
    }
}

/// Probes links and records their reachability.
pub struct LinkHealthCheckJob {
    links: Arc<dyn LinkStore>,
    prober: Arc<dyn HttpProber>,
    max_concurrent_probes: usize,
    probe_timeout: Duration,
    metrics: MetricsCollector,
}

impl LinkHealthCheckJob {
    /// Creates a job with the default concurrency and timeout.
    pub fn new(links: Arc<dyn LinkStore>, prober: Arc<dyn HttpProber>) -> Self {
        Self {
            links,
            prober,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the cap on simultaneous probes.
    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max.max(1);
        self
    }

    /// Sets the per-probe deadline.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn check(&self, link: &Link, semaphore: &Semaphore) -> LinkCheck {
        let mut check = LinkCheck {
            id: link.id,
            previous: link.status,
            observed: LinkStatus::Abnormal,
            probed: false,
        };

        if !is_https(&link.url) {
            debug!(link_id = link.id, url = %link.url, "Link is not https; marking abnormal");
            return check;
        }

        // Only fails once the semaphore is closed, which counts as unreachable.
        let Ok(_permit) = semaphore.acquire().await else {
            return check;
        };

        check.probed = true;
        self.metrics.probe_started();
        let result = self.prober.get_status(&link.url, self.probe_timeout).await;
        self.metrics.probe_finished();

        check.observed = match result {
            Ok(code) if (200..300).contains(&code) => LinkStatus::Normal,
            Ok(code) => {
                debug!(link_id = link.id, url = %link.url, status = code, "Link answered non-2xx");
                LinkStatus::Abnormal
            }
            Err(e) => {
                debug!(link_id = link.id, url = %link.url, error = %e, "Link probe failed");
                LinkStatus::Abnormal
            }
        };
        check
    }
}

fn is_https(url: &str) -> bool {
    Url::parse(url)
        .map(|url| url.scheme() == "https")
        .unwrap_or(false)
}

#[async_trait]
impl PeriodicJob for LinkHealthCheckJob {
    fn name(&self) -> &'static str {
        LINK_HEALTH_CHECK
    }

    async fn run_pass(&self) -> Result<PassReport, PassError> {
        let started = Instant::now();
        let mut report = PassReport::new(LINK_HEALTH_CHECK);
        let mut errors: Vec<JobError> = Vec::new();

        let links = match self.links.list_links().await {
            Ok(links) => links,
            Err(e) => {
                error!(job = LINK_HEALTH_CHECK, error = %e, "Failed to list links");
                errors.push(e.into());
                report.duration = started.elapsed();
                return PassError::check(report, errors);
            }
        };

        let semaphore = Semaphore::new(self.max_concurrent_probes);
        let checks = join_all(links.iter().map(|link| self.check(link, &semaphore))).await;

        report.examined = checks.len();
        report.skipped = checks.iter().filter(|c| !c.probed).count();
        let changes: BTreeMap<i64, LinkStatus> = checks.iter().filter_map(LinkCheck::change).collect();

        if changes.is_empty() {
            debug!(job = LINK_HEALTH_CHECK, links = links.len(), "No link status changes");
        } else {
            report.writes = 1;
            match self.links.apply_link_statuses(&changes).await {
                Ok(rows) => {
                    report.applied = changes.len();
                    for status in [LinkStatus::Normal, LinkStatus::Abnormal] {
                        let count = changes.values().filter(|s| **s == status).count();
                        if count > 0 {
                            self.metrics.record_status_change(status, count as u64);
                        }
                    }
                    info!(
                        job = LINK_HEALTH_CHECK,
                        links = links.len(),
                        changed = changes.len(),
                        rows,
                        "Updated link statuses"
                    );
                }
                Err(e) => {
                    error!(
                        job = LINK_HEALTH_CHECK,
                        changed = changes.len(),
                        error = %e,
                        "Link status write failed"
                    );
                    errors.push(e.into());
                }
            }
        }

        report.duration = started.elapsed();
        PassError::check(report, errors)
    }
}

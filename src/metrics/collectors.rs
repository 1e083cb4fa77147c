//! Recording helpers for the background jobs.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics so call sites never
//! touch the `OnceLock`s directly. Every method is a no-op until
//! [`init_metrics`](super::init_metrics) has run.

use std::time::Duration;

use super::prometheus::{
    JOB_PASSES_TOTAL, JOB_PASS_DURATION, LINK_PROBES_IN_FLIGHT, LINK_STATUS_CHANGES,
    VIEW_COUNTS_FLUSHED,
};
use crate::entity::LinkStatus;

/// Metrics collector for the write-back jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record a finished pass.
    ///
    /// # Arguments
    ///
    /// * `job` - Job name (e.g., "view_count_flush")
    /// * `success` - Whether the pass finished without errors
    /// * `duration` - Wall time of the pass
    pub fn record_pass(&self, job: &str, success: bool, duration: Duration) {
        let outcome = if success { "ok" } else { "error" };

        if let Some(passes) = JOB_PASSES_TOTAL.get() {
            passes.with_label_values(&[job, outcome]).inc();
        }

        if let Some(histogram) = JOB_PASS_DURATION.get() {
            histogram
                .with_label_values(&[job])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(
            job = job,
            outcome = outcome,
            duration_secs = duration.as_secs_f64(),
            "Recorded pass metric"
        );
    }

    /// Record views written back to the database.
    pub fn record_views_flushed(&self, views: i64) {
        if views <= 0 {
            return;
        }
        if let Some(flushed) = VIEW_COUNTS_FLUSHED.get() {
            flushed.inc_by(views as f64);
        }
    }

    /// Record link status transitions written to the database.
    pub fn record_status_change(&self, status: LinkStatus, count: u64) {
        if let Some(changes) = LINK_STATUS_CHANGES.get() {
            changes
                .with_label_values(&[status.as_str()])
                .inc_by(count as f64);
        }
    }

    /// Mark a link probe as started.
    pub fn probe_started(&self) {
        if let Some(gauge) = LINK_PROBES_IN_FLIGHT.get() {
            gauge.inc();
        }
    }

    /// Mark a link probe as finished.
    pub fn probe_finished(&self) {
        if let Some(gauge) = LINK_PROBES_IN_FLIGHT.get() {
            gauge.dec();
        }
    }
}

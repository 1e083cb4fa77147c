//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by the background jobs and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all blog-server metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Completed passes, labeled by job and outcome (`ok` / `error`).
pub static JOB_PASSES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Pass duration in seconds, labeled by job.
pub static JOB_PASS_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Views moved from the cache into `posts.view_count`.
pub static VIEW_COUNTS_FLUSHED: OnceLock<Counter> = OnceLock::new();

/// Link status transitions written, labeled by the new status.
pub static LINK_STATUS_CHANGES: OnceLock<CounterVec> = OnceLock::new();

/// Link probes currently awaiting a response.
pub static LINK_PROBES_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Until then every recording call is a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let job_passes_total = CounterVec::new(
        Opts::new("blog_job_passes_total", "Total background job passes"),
        &["job", "outcome"],
    )?;

    let job_pass_duration = HistogramVec::new(
        HistogramOpts::new(
            "blog_job_pass_duration_seconds",
            "Background job pass duration in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        &["job"],
    )?;

    let view_counts_flushed = Counter::new(
        "blog_view_counts_flushed_total",
        "Views written back from the cache to the database",
    )?;

    let link_status_changes = CounterVec::new(
        Opts::new(
            "blog_link_status_changes_total",
            "Link status transitions written to the database",
        ),
        &["status"],
    )?;

    let link_probes_in_flight = Gauge::new(
        "blog_link_probes_in_flight",
        "Link probes currently awaiting a response",
    )?;

    registry.register(Box::new(job_passes_total.clone()))?;
    registry.register(Box::new(job_pass_duration.clone()))?;
    registry.register(Box::new(view_counts_flushed.clone()))?;
    registry.register(Box::new(link_status_changes.clone()))?;
    registry.register(Box::new(link_probes_in_flight.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOB_PASSES_TOTAL.set(job_passes_total);
    let _ = JOB_PASS_DURATION.set(job_pass_duration);
    let _ = VIEW_COUNTS_FLUSHED.set(view_counts_flushed);
    let _ = LINK_STATUS_CHANGES.set(link_status_changes);
    let _ = LINK_PROBES_IN_FLIGHT.set(link_probes_in_flight);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_recording() {
        let _ = init_metrics();
        if let Some(flushed) = VIEW_COUNTS_FLUSHED.get() {
            flushed.inc_by(3.0);
        }
        if let Some(passes) = JOB_PASSES_TOTAL.get() {
            passes.with_label_values(&["view_count_flush", "ok"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("blog_view_counts_flushed_total"));
        assert!(metrics.contains("blog_job_passes_total"));
    }
}

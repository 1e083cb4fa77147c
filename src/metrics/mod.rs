//! Metrics module for Prometheus-based monitoring.
//!
//! Covers pass outcomes and durations for both background jobs, views
//! flushed to the database, link status transitions, and in-flight probes.
//!
//! # Example
//!
//! ```ignore
//! use blog_server::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_views_flushed(7);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    JOB_PASSES_TOTAL, JOB_PASS_DURATION, LINK_PROBES_IN_FLIGHT, LINK_STATUS_CHANGES, REGISTRY,
    VIEW_COUNTS_FLUSHED,
};

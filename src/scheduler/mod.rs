//! Periodic background jobs.
//!
//! This module owns the write-back jobs and the loop that drives them:
//!
//! - **ViewCountFlushJob**: moves buffered view counters from the cache into
//!   `posts.view_count`
//! - **LinkHealthCheckJob**: probes every link and records status changes
//! - **Scheduler**: runs each job in its own task, once per tick, until the
//!   shared cancellation token fires
//!
//! # Architecture
//!
//! ```text
//!                  ┌────────────────────┐
//!                  │     Scheduler      │
//!                  │ (CancellationToken)│
//!                  └─────────┬──────────┘
//!               ┌────────────┴────────────┐
//!               ▼                         ▼
//!     ┌──────────────────┐      ┌──────────────────┐
//!     │ ViewCountFlushJob│      │LinkHealthCheckJob│
//!     └───┬─────────┬────┘      └───┬─────────┬────┘
//!         │         │               │         │
//!         ▼         ▼               ▼         ▼
//!      Cache    PostStore       LinkStore  HttpProber
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use blog_server::scheduler::{HourlyTick, Scheduler};
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let handles = Scheduler::new(HourlyTick)
//!     .with_job(flush_job)
//!     .with_job(link_job)
//!     .start(token.clone());
//!
//! // Shutdown: in-flight passes finish, no new pass starts.
//! token.cancel();
//! futures::future::join_all(handles).await;
//! ```

pub mod job;
pub mod link_health;
pub mod tick;
pub mod view_count_flush;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics::MetricsCollector;

pub use job::{JobError, PassError, PassReport, PeriodicJob};
pub use link_health::{LinkHealthCheckJob, LINK_HEALTH_CHECK};
pub use tick::{HourlyTick, IntervalTick, TickPolicy};
pub use view_count_flush::{ViewCountFlushJob, VIEW_COUNT_FLUSH};

/// Runs a set of periodic jobs, each on its own task.
pub struct Scheduler {
    jobs: Vec<Arc<dyn PeriodicJob>>,
    tick: Arc<dyn TickPolicy>,
}

impl Scheduler {
    /// Creates a scheduler with no jobs.
    pub fn new(tick: impl TickPolicy + 'static) -> Self {
        Self {
            jobs: Vec::new(),
            tick: Arc::new(tick),
        }
    }

    /// Adds a job.
    pub fn with_job(mut self, job: impl PeriodicJob + 'static) -> Self {
        self.jobs.push(Arc::new(job));
        self
    }

    /// Spawns one loop per job.
    ///
    /// The loops stop when `token` is cancelled. A pass that is already
    /// running is finished first; no pass starts after cancellation.
    pub fn start(&self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(jobs = self.jobs.len(), "Scheduler started");

        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                let tick = Arc::clone(&self.tick);
                let token = token.clone();
                tokio::spawn(async move { run_loop(job, tick, token).await })
            })
            .collect()
    }
}

async fn run_loop(job: Arc<dyn PeriodicJob>, tick: Arc<dyn TickPolicy>, token: CancellationToken) {
    let name = job.name();
    info!(job = name, "Job loop started");

    loop {
        let now = Utc::now();
        let next = tick.next_tick(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(job = name, next = %next, "Waiting for next tick");

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let _ = run_pass_logged(job.as_ref()).await;
    }

    info!(job = name, "Job loop stopped");
}

/// Runs one pass, logging and recording its outcome.
///
/// Used by the scheduler loops and by one-shot invocations.
pub async fn run_pass_logged(job: &dyn PeriodicJob) -> Result<PassReport, PassError> {
    let metrics = MetricsCollector::new();
    let result = job.run_pass().await;

    match &result {
        Ok(report) => {
            metrics.record_pass(report.job, true, report.duration);
            info!(
                job = report.job,
                examined = report.examined,
                applied = report.applied,
                skipped = report.skipped,
                duration_ms = report.duration.as_millis() as u64,
                "Pass completed"
            );
        }
        Err(e) => {
            metrics.record_pass(e.job, false, e.report.duration);
            error!(job = e.job, error = %e, "Pass completed with errors");
        }
    }

    result
}

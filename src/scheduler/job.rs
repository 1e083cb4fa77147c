//! Job definitions for the scheduler.
//!
//! - `PeriodicJob`: a reconciliation pass the scheduler runs on every tick
//! - `PassReport`: what one pass examined and wrote
//! - `JobError` / `PassError`: failures collected during a pass

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::cache::CacheError;
use crate::storage::StorageError;

/// A background job run once per scheduler tick.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Stable job name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Runs one reconciliation pass to completion.
    ///
    /// A pass never panics on backend failures. Failures are collected into
    /// the returned [`PassError`] together with whatever the pass managed to
    /// do before and after them.
    async fn run_pass(&self) -> Result<PassReport, PassError>;
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Job name.
    pub job: &'static str,
    /// Cache entries popped or links examined.
    pub examined: usize,
    /// Distinct rows whose value changed.
    pub applied: usize,
    /// Malformed counters or links that were not probed.
    pub skipped: usize,
    /// Statements issued against the database (0 or 1).
    pub writes: usize,
    /// Wall time of the pass.
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl PassReport {
    /// Creates an empty report for `job`.
    pub fn new(job: &'static str) -> Self {
        Self {
            job,
            ..Default::default()
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// A single failure inside a pass.
#[derive(Debug, Error)]
pub enum JobError {
    /// The cache backend failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The relational store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Every failure of one pass, with the partial report.
#[derive(Debug, Error)]
#[error("{job} pass finished with {} error(s): {}", .errors.len(), join_errors(.errors))]
pub struct PassError {
    /// Job name.
    pub job: &'static str,
    /// Failures in the order they happened.
    pub errors: Vec<JobError>,
    /// What the pass did despite the failures.
    pub report: PassReport,
}

impl PassError {
    /// Wraps `errors` if there are any, otherwise returns the report.
    pub fn check(report: PassReport, errors: Vec<JobError>) -> Result<PassReport, PassError> {
        if errors.is_empty() {
            Ok(report)
        } else {
            Err(PassError {
                job: report.job,
                errors,
                report,
            })
        }
    }
}

fn join_errors(errors: &[JobError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

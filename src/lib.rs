//! blog-server: background write-back jobs for a blog backend.
//!
//! Post views are buffered in a key-value cache and flushed into the
//! relational store once per hour; outbound links are probed on the same
//! cadence and their health status is recorded. Both jobs run under a
//! scheduler that stops on a shared cancellation token.

pub mod cache;
pub mod cli;
pub mod config;
pub mod entity;
pub mod metrics;
pub mod probe;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use cache::{CacheClient, CacheError, MemoryCache, RedisCache};
pub use config::{AppConfig, ConfigError};
pub use scheduler::{LinkHealthCheckJob, PassError, PassReport, Scheduler, ViewCountFlushJob};
pub use storage::{Database, SqliteDatabase, StorageError};

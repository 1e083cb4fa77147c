//! Command-line interface for blog-server.
//!
//! Provides the long-running scheduler plus one-shot commands for each job.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};

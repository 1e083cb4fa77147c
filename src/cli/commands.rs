//! CLI command definitions for blog-server.
//!
//! `run` starts the scheduler and blocks until Ctrl-C. The other commands run
//! a single job pass (or read) against the configured backends and exit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{CacheClient, MemoryCache, RedisCache, ViewCountKeys};
use crate::config::AppConfig;
use crate::metrics::{export_metrics, init_metrics};
use crate::probe::ReqwestProber;
use crate::scheduler::{
    run_pass_logged, HourlyTick, IntervalTick, LinkHealthCheckJob, PassReport, PeriodicJob,
    Scheduler, ViewCountFlushJob,
};
use crate::storage::{Database, LinkStore, PostStore, SqliteDatabase};

/// Default SQLite database file for `--store sqlite`.
const DEFAULT_SQLITE_PATH: &str = "./blog.db";

/// Background write-back jobs for the blog backend.
#[derive(Parser, Debug)]
#[command(name = "blog-server")]
#[command(about = "Flush buffered view counts and check link health for the blog backend")]
#[command(version)]
#[command(
    long_about = "blog-server runs the blog's background write-back jobs.\n\nView counts buffered in the cache are flushed into the posts table, and every outbound link is probed and its status recorded. Both jobs run hourly under `run`, or once on demand.\n\nExample usage:\n  blog-server run\n  blog-server --store sqlite --cache memory flush-views --json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Relational store backend.
    #[arg(long, value_enum, default_value_t = StoreKind::Postgres, global = true)]
    pub store: StoreKind,

    /// SQLite database file, used with `--store sqlite`.
    #[arg(long, default_value = DEFAULT_SQLITE_PATH, global = true)]
    pub sqlite_path: String,

    /// Cache backend.
    #[arg(long, value_enum, default_value_t = CacheKind::Redis, global = true)]
    pub cache: CacheKind,
}

/// Relational store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// PostgreSQL at `DATABASE_URL`.
    Postgres,
    /// Local SQLite file.
    Sqlite,
}

/// Cache backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheKind {
    /// Redis at `REDIS_URL`.
    Redis,
    /// Process-local cache.
    Memory,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run both jobs on schedule until Ctrl-C.
    Run(RunArgs),

    /// Flush buffered view counts once.
    #[command(name = "flush-views")]
    FlushViews(OutputArgs),

    /// Probe every link once and record status changes.
    #[command(name = "check-links")]
    CheckLinks(OutputArgs),

    /// Print link totals by status.
    #[command(name = "link-overview")]
    LinkOverview(OutputArgs),
}

/// Arguments for `blog-server run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run passes every N seconds instead of at the top of each hour.
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

/// Output options shared by one-shot commands.
#[derive(Parser, Debug)]
pub struct OutputArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    match &cli.command {
        Commands::Run(args) => run_scheduler_command(&cli, &config, args).await,
        Commands::FlushViews(args) => run_flush_views_command(&cli, &config, args).await,
        Commands::CheckLinks(args) => run_check_links_command(&cli, &config, args).await,
        Commands::LinkOverview(args) => run_link_overview_command(&cli, &config, args).await,
    }
}

// ============================================================================
// Backend wiring
// ============================================================================

async fn connect_store(
    cli: &Cli,
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn PostStore>, Arc<dyn LinkStore>)> {
    match cli.store {
        StoreKind::Postgres => {
            let url = config.require_database_url()?;
            let db = Arc::new(
                Database::connect(url, config.db_max_connections)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            );
            info!(max_connections = config.db_max_connections, "Connected to PostgreSQL");
            let posts: Arc<dyn PostStore> = db.clone();
            let links: Arc<dyn LinkStore> = db;
            Ok((posts, links))
        }
        StoreKind::Sqlite => {
            let db = Arc::new(
                SqliteDatabase::open(&cli.sqlite_path)
                    .await
                    .with_context(|| format!("failed to open SQLite store {}", cli.sqlite_path))?,
            );
            let posts: Arc<dyn PostStore> = db.clone();
            let links: Arc<dyn LinkStore> = db;
            Ok((posts, links))
        }
    }
}

async fn connect_cache(cli: &Cli, config: &AppConfig) -> anyhow::Result<Arc<dyn CacheClient>> {
    match cli.cache {
        CacheKind::Redis => {
            let cache = RedisCache::connect(&config.redis_url)
                .await
                .context("failed to connect to Redis")?
                .with_default_ttl(config.cache_default_ttl);
            Ok(Arc::new(cache))
        }
        CacheKind::Memory => {
            warn!("Using the in-memory cache; only views recorded by this process are flushed");
            Ok(Arc::new(MemoryCache::with_default_ttl(
                config.cache_default_ttl,
            )))
        }
    }
}

fn flush_job(
    config: &AppConfig,
    cache: Arc<dyn CacheClient>,
    posts: Arc<dyn PostStore>,
) -> ViewCountFlushJob {
    ViewCountFlushJob::new(cache, posts)
        .with_keys(ViewCountKeys::new(config.cache_namespace.clone()))
        .with_scan_count(config.view_flush_scan_count)
}

fn link_job(config: &AppConfig, links: Arc<dyn LinkStore>) -> LinkHealthCheckJob {
    LinkHealthCheckJob::new(links, Arc::new(ReqwestProber::new()))
        .with_max_concurrent_probes(config.link_probe_concurrency)
        .with_probe_timeout(config.link_probe_timeout)
}

// ============================================================================
// Commands
// ============================================================================

async fn run_scheduler_command(cli: &Cli, config: &AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    init_metrics()?;

    let (posts, links) = connect_store(cli, config).await?;
    let cache = connect_cache(cli, config).await?;

    let scheduler = match args.interval_secs {
        Some(secs) => Scheduler::new(IntervalTick(Duration::from_secs(secs.max(1)))),
        None => Scheduler::new(HourlyTick),
    }
    .with_job(flush_job(config, cache, posts))
    .with_job(link_job(config, links));

    let token = CancellationToken::new();
    let handles = scheduler.start(token.clone());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested; waiting for running passes to finish");
    token.cancel();

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Job loop panicked");
        }
    }

    info!(metrics = %export_metrics(), "Scheduler stopped");
    Ok(())
}

async fn run_flush_views_command(
    cli: &Cli,
    config: &AppConfig,
    args: &OutputArgs,
) -> anyhow::Result<()> {
    let (posts, _) = connect_store(cli, config).await?;
    let cache = connect_cache(cli, config).await?;
    run_one_pass(&flush_job(config, cache, posts), args.json).await
}

async fn run_check_links_command(
    cli: &Cli,
    config: &AppConfig,
    args: &OutputArgs,
) -> anyhow::Result<()> {
    let (_, links) = connect_store(cli, config).await?;
    run_one_pass(&link_job(config, links), args.json).await
}

async fn run_link_overview_command(
    cli: &Cli,
    config: &AppConfig,
    args: &OutputArgs,
) -> anyhow::Result<()> {
    let (_, links) = connect_store(cli, config).await?;
    let overview = links.overview().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
    } else {
        println!("Total:     {}", overview.total);
        println!("Normal:    {}", overview.normal);
        println!("Abnormal:  {}", overview.abnormal);
        println!("Pending:   {}", overview.pending);
    }
    Ok(())
}

async fn run_one_pass(job: &dyn PeriodicJob, json: bool) -> anyhow::Result<()> {
    match run_pass_logged(job).await {
        Ok(report) => {
            print_report(&report, json)?;
            Ok(())
        }
        Err(e) => {
            print_report(&e.report, json)?;
            Err(e.into())
        }
    }
}

fn print_report(report: &PassReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("=== {} ===", report.job);
        println!("Examined:  {}", report.examined);
        println!("Applied:   {}", report.applied);
        println!("Skipped:   {}", report.skipped);
        println!("Writes:    {}", report.writes);
        println!("Duration:  {:?}", report.duration);
    }
    Ok(())
}

//! BookDW - book enrichment pipeline CLI

use anyhow::{Context, Result};
use bookdw_common::logging::{init_logging, LogConfig, LogLevel};
use bookdw_etl::{EtlConfig, JobQueue, Worker};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

mod seed;

#[derive(Parser, Debug)]
#[command(name = "bookdw")]
#[command(author, version, about = "BookDW enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Seed pending jobs from a CSV file
    Seed {
        /// CSV file with Title, Author, and optional ISBN columns
        #[arg(short, long)]
        csv: String,
    },

    /// Claim and process job batches
    Work {
        /// Keep claiming batches until the queue is empty
        #[arg(long)]
        drain: bool,
    },

    /// Reset failed jobs back to pending
    Reset {
        /// Reset a single job; without this, resets every failed job
        #[arg(long)]
        job: Option<Uuid>,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bookdw".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = EtlConfig::load()?;
    let pool = connect(&config).await?;

    match cli.command {
        Command::Seed { csv } => {
            let queue = JobQueue::new(pool, config.retry_max_attempts);
            let summary = seed::run(&queue, csv.as_ref()).await?;
            info!(
                inserted = summary.inserted,
                skipped_duplicates = summary.skipped_duplicates,
                invalid = summary.invalid,
                "seeding complete"
            );
        },
        Command::Work { drain } => {
            let worker = Worker::new(pool, &config)?;
            let stats = if drain {
                worker.run_until_drained().await?
            } else {
                worker.run_batch().await?
            };
            info!(
                claimed = stats.jobs_claimed,
                completed = stats.jobs_completed,
                retrying = stats.jobs_marked_for_retry,
                permanently_failed = stats.jobs_permanently_failed,
                duration_secs = stats.duration_secs,
                "work complete"
            );
        },
        Command::Reset { job } => {
            let queue = JobQueue::new(pool, config.retry_max_attempts);
            match job {
                Some(id) => {
                    if queue.reset(id).await? {
                        info!(job_id = %id, "job reset to pending");
                    } else {
                        info!(job_id = %id, "no failed job with that id");
                    }
                },
                None => {
                    let reset = queue.reset_all_failed().await?;
                    info!(reset, "failed jobs reset to pending");
                },
            }
        },
        Command::Migrate => {
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .context("Failed to apply migrations")?;
            info!("migrations applied");
        },
    }

    Ok(())
}

async fn connect(config: &EtlConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")
}

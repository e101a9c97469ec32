//! Batch worker
//!
//! Drives one claim cycle: claim a batch, then for each job run
//! extraction, reconciliation, and load in strict order, recording the
//! terminal outcome on the job row. Multiple worker processes can run
//! side by side; the queue claim keeps them off each other's jobs.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::EtlConfig;
use crate::jobs::{Job, JobFailure};
use crate::queue::JobQueue;
use crate::reconcile::{reconcile, ReconcilePolicy};
use crate::sources::{
    fetch_with_retry, AdapterError, FetchOutcome, GoogleBooksAdapter, IdentityHint,
    OpenLibraryAdapter, RawRecord, RetryPolicy, Source, SourceAdapter,
};
use crate::stats::WorkerStats;
use crate::warehouse::WarehouseLoader;

pub struct Worker {
    queue: JobQueue,
    loader: WarehouseLoader,
    google_books: GoogleBooksAdapter,
    open_library: OpenLibraryAdapter,
    retry_policy: RetryPolicy,
    reconcile_policy: ReconcilePolicy,
    batch_size: i64,
    retry_ceiling: i32,
}

impl Worker {
    pub fn new(pool: PgPool, config: &EtlConfig) -> Result<Self> {
        let adapter_timeout = Duration::from_secs(config.adapter_timeout_secs);

        let google_books =
            GoogleBooksAdapter::new(&config.google_books_base_url, adapter_timeout)
                .context("Failed to build Google Books adapter")?;
        let open_library =
            OpenLibraryAdapter::new(&config.open_library_base_url, adapter_timeout)
                .context("Failed to build Open Library adapter")?;

        Ok(Self {
            queue: JobQueue::new(pool.clone(), config.retry_max_attempts),
            loader: WarehouseLoader::new(pool, Duration::from_secs(config.load_timeout_secs)),
            google_books,
            open_library,
            retry_policy: RetryPolicy {
                max_attempts: config.adapter_max_attempts,
                base_backoff: Duration::from_millis(config.adapter_backoff_ms),
            },
            reconcile_policy: ReconcilePolicy {
                primary: config.primary_source,
            },
            batch_size: config.batch_size,
            retry_ceiling: config.retry_max_attempts,
        })
    }

    /// Run one claim cycle. Returns the run's counters; an empty claim
    /// is a normal, quiet run.
    pub async fn run_batch(&self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::new();

        let jobs = self.queue.claim(self.batch_size).await?;
        stats.jobs_claimed = jobs.len() as i64;

        if jobs.is_empty() {
            stats.complete();
            return Ok(stats);
        }

        info!(claimed = jobs.len(), "processing job batch");

        for job in &jobs {
            match self.process_job(job, &mut stats).await {
                Ok(conflicts) => {
                    self.queue.complete(job.id).await?;
                    stats.inc_completed();
                    stats.conflicts_resolved += conflicts;
                },
                Err(failure) => {
                    error!(
                        job_id = %job.id,
                        title = %job.title,
                        retry_count = job.retry_count,
                        error = %failure,
                        "job failed"
                    );
                    self.queue.fail(job.id, &failure).await?;
                    if job.retry_count + 1 >= self.retry_ceiling {
                        stats.inc_permanently_failed();
                    } else {
                        stats.inc_marked_for_retry();
                    }
                },
            }
        }

        stats.complete();
        info!(
            claimed = stats.jobs_claimed,
            completed = stats.jobs_completed,
            retrying = stats.jobs_marked_for_retry,
            permanently_failed = stats.jobs_permanently_failed,
            conflicts = stats.conflicts_resolved,
            duration_secs = stats.duration_secs,
            "batch finished"
        );

        Ok(stats)
    }

    /// Run claim cycles until the queue is empty
    pub async fn run_until_drained(&self) -> Result<WorkerStats> {
        let mut total = WorkerStats::new();
        loop {
            let batch = self.run_batch().await?;
            if batch.jobs_claimed == 0 {
                break;
            }
            total.merge(&batch);
        }
        total.complete();
        Ok(total)
    }

    /// Extraction, reconciliation, and load for one claimed job.
    /// Returns the number of conflicts resolved during the merge.
    async fn process_job(&self, job: &Job, stats: &mut WorkerStats) -> Result<i64, JobFailure> {
        let hint = IdentityHint {
            title: job.title.clone(),
            author: job.author.clone(),
            isbn: job.isbn.clone(),
        };

        // Both sources fetch concurrently; neither aborts the other.
        let (gb_result, ol_result) = tokio::join!(
            fetch_with_retry(&self.google_books, &hint, self.retry_policy),
            fetch_with_retry(&self.open_library, &hint, self.retry_policy),
        );

        let gb = Self::tally(&self.google_books, gb_result, stats);
        let ol = Self::tally(&self.open_library, ol_result, stats);

        let (gb_record, ol_record) = Self::settle_outcomes(gb, ol)?;

        let merged = reconcile(
            gb_record.as_ref(),
            ol_record.as_ref(),
            job.isbn.as_deref(),
            &self.reconcile_policy,
        )
        .map_err(|e| JobFailure::Reconcile(e.to_string()))?;

        for conflict in &merged.conflicts {
            warn!(
                job_id = %job.id,
                field = conflict.field,
                chosen = %conflict.chosen,
                discarded = %conflict.secondary,
                "source conflict resolved"
            );
        }

        self.loader
            .load(&merged.book)
            .await
            .map_err(|e| JobFailure::Load(e.to_string()))?;

        Ok(merged.conflicts.len() as i64)
    }

    fn tally(
        adapter: &dyn SourceAdapter,
        result: Result<FetchOutcome, AdapterError>,
        stats: &mut WorkerStats,
    ) -> Result<Option<RawRecord>, AdapterError> {
        let hit = matches!(result, Ok(FetchOutcome::Found(_)));
        match adapter.source() {
            Source::GoogleBooks => {
                if hit {
                    stats.google_books_hits += 1;
                } else {
                    stats.google_books_misses += 1;
                }
            },
            Source::OpenLibrary => {
                if hit {
                    stats.open_library_hits += 1;
                } else {
                    stats.open_library_misses += 1;
                }
            },
        }
        result.map(|outcome| match outcome {
            FetchOutcome::Found(record) => Some(record),
            FetchOutcome::NotFound => None,
        })
    }

    /// Decide whether the pair of fetch outcomes lets the job proceed.
    ///
    /// An exhausted transient retry on either side always fails the
    /// job. A permanent failure on one side is tolerated when the
    /// other side produced a record. Not-found is never an error on
    /// its own, but both sides empty means there is nothing to enrich.
    fn settle_outcomes(
        gb: Result<Option<RawRecord>, AdapterError>,
        ol: Result<Option<RawRecord>, AdapterError>,
    ) -> Result<(Option<RawRecord>, Option<RawRecord>), JobFailure> {
        if let Err(err @ AdapterError::Exhausted { .. }) = &gb {
            return Err(JobFailure::SourceExhausted(err.to_string()));
        }
        if let Err(err @ AdapterError::Exhausted { .. }) = &ol {
            return Err(JobFailure::SourceExhausted(err.to_string()));
        }

        match (gb, ol) {
            (Ok(gb), Ok(ol)) => {
                if gb.is_none() && ol.is_none() {
                    Err(JobFailure::NoData(
                        "neither source returned a record".to_string(),
                    ))
                } else {
                    Ok((gb, ol))
                }
            },
            (Err(err), Ok(Some(ol))) => {
                warn!(error = %err, "source failed permanently, continuing with the other");
                Ok((None, Some(ol)))
            },
            (Ok(Some(gb)), Err(err)) => {
                warn!(error = %err, "source failed permanently, continuing with the other");
                Ok((Some(gb), None))
            },
            (Err(err), Ok(None)) | (Ok(None), Err(err)) => {
                Err(JobFailure::SourcePermanent(err.to_string()))
            },
            (Err(gb_err), Err(ol_err)) => Err(JobFailure::SourcePermanent(format!(
                "{}; {}",
                gb_err, ol_err
            ))),
        }
    }
}

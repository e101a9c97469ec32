//! Job queue operations
//!
//! All state transitions for enrichment jobs go through [`JobQueue`].
//! The claim is the mutual-exclusion boundary between concurrent worker
//! processes: a single `UPDATE` over a `FOR UPDATE SKIP LOCKED`
//! subselect guarantees no two claimers receive the same job.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::jobs::{Job, JobFailure, NewJob};

/// Queue handle over the `jobs` table
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    retry_ceiling: i32,
}

impl JobQueue {
    pub fn new(pool: PgPool, retry_ceiling: i32) -> Self {
        Self { pool, retry_ceiling }
    }

    /// Claim up to `batch_size` jobs atomically, moving them to `processing`.
    ///
    /// Eligible jobs are `pending`, plus `failed` jobs whose retry count
    /// is still below the ceiling. Oldest first. An empty batch is a
    /// normal result, not an error.
    pub async fn claim(&self, batch_size: i64) -> Result<Vec<Job>> {
        let jobs: Vec<Job> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending'
                   OR (status = 'failed' AND retry_count < $1)
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, title, author, isbn, status, retry_count,
                      error_detail, created_at, updated_at
            "#,
        )
        .bind(self.retry_ceiling)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .context("Failed to claim jobs")?;

        debug!(claimed = jobs.len(), "claimed job batch");
        Ok(jobs)
    }

    /// Mark a job completed. Only called after the load transaction
    /// committed.
    pub async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', error_detail = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark job completed")?;

        Ok(())
    }

    /// Mark a job failed with a classified detail and bump its retry count.
    ///
    /// The ceiling is not checked here; `claim` stops selecting the job
    /// once `retry_count` reaches it.
    pub async fn fail(&self, job_id: Uuid, failure: &JobFailure) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_detail = $2,
                retry_count = retry_count + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(failure.detail())
        .execute(&self.pool)
        .await
        .context("Failed to mark job failed")?;

        Ok(())
    }

    /// Manually reset one failed job to `pending`, zeroing its retries.
    ///
    /// Returns whether a row was actually reset.
    pub async fn reset(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', retry_count = 0, error_detail = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to reset job")?;

        Ok(result.rows_affected() > 0)
    }

    /// Manually reset every failed job to `pending`.
    pub async fn reset_all_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', retry_count = 0, error_detail = NULL,
                updated_at = NOW()
            WHERE status = 'failed'
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to reset failed jobs")?;

        let reset = result.rows_affected();
        info!(reset, "reset failed jobs to pending");
        Ok(reset)
    }

    /// Insert a new pending job
    pub async fn insert(&self, job: &NewJob) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (id, title, author, isbn, status, retry_count)
            VALUES ($1, $2, $3, $4, 'pending', 0)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&job.title)
        .bind(&job.author)
        .bind(&job.isbn)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert job")?;

        Ok(id)
    }

    /// Check whether an equivalent job already exists.
    ///
    /// Keyed on ISBN when present, otherwise on (title, author).
    pub async fn find_duplicate(&self, job: &NewJob) -> Result<Option<Uuid>> {
        let existing: Option<Uuid> = match &job.isbn {
            Some(isbn) => {
                sqlx::query_scalar("SELECT id FROM jobs WHERE isbn = $1 LIMIT 1")
                    .bind(isbn)
                    .fetch_optional(&self.pool)
                    .await
            },
            None => {
                sqlx::query_scalar(
                    "SELECT id FROM jobs WHERE title = $1 AND author = $2 LIMIT 1",
                )
                .bind(&job.title)
                .bind(&job.author)
                .fetch_optional(&self.pool)
                .await
            },
        }
        .context("Failed to check for duplicate job")?;

        Ok(existing)
    }

    /// Count jobs per status, for end-of-run summaries
    pub async fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
            .fetch_all(&self.pool)
            .await
            .context("Failed to count jobs by status")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/bookdw_test".to_string());
        PgPool::connect(&url).await.unwrap()
    }

    fn sample_job(title: &str, isbn: Option<&str>) -> NewJob {
        NewJob {
            title: title.to_string(),
            author: "Test Author".to_string(),
            isbn: isbn.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_claim_moves_jobs_to_processing() {
        let queue = JobQueue::new(test_pool().await, 3);
        queue.insert(&sample_job("Claim Test", None)).await.unwrap();

        let claimed = queue.claim(10).await.unwrap();
        assert!(!claimed.is_empty());
        assert!(claimed.iter().all(|j| j.status == JobStatus::Processing));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_claim_is_exclusive_across_claimers() {
        let pool = test_pool().await;
        let a = JobQueue::new(pool.clone(), 3);
        let b = JobQueue::new(pool, 3);
        a.insert(&sample_job("Exclusive Test", None)).await.unwrap();

        let (left, right) = tokio::join!(a.claim(100), b.claim(100));
        let left = left.unwrap();
        let right = right.unwrap();

        for l in &left {
            assert!(right.iter().all(|r| r.id != l.id));
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_fail_below_ceiling_remains_claimable() {
        let queue = JobQueue::new(test_pool().await, 3);
        let id = queue.insert(&sample_job("Retry Test", None)).await.unwrap();

        let claimed = queue.claim(100).await.unwrap();
        assert!(claimed.iter().any(|j| j.id == id));

        queue
            .fail(id, &JobFailure::SourceExhausted("google books".to_string()))
            .await
            .unwrap();

        let reclaimed = queue.claim(100).await.unwrap();
        assert!(reclaimed.iter().any(|j| j.id == id && j.retry_count == 1));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reset_zeroes_retry_count() {
        let queue = JobQueue::new(test_pool().await, 1);
        let id = queue.insert(&sample_job("Reset Test", None)).await.unwrap();

        queue.claim(100).await.unwrap();
        queue
            .fail(id, &JobFailure::NoData("both sources empty".to_string()))
            .await
            .unwrap();

        // Ceiling of 1 reached, no longer claimable.
        let reclaimed = queue.claim(100).await.unwrap();
        assert!(reclaimed.iter().all(|j| j.id != id));

        assert!(queue.reset(id).await.unwrap());
        let after_reset = queue.claim(100).await.unwrap();
        assert!(after_reset.iter().any(|j| j.id == id && j.retry_count == 0));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_find_duplicate_prefers_isbn() {
        let queue = JobQueue::new(test_pool().await, 3);
        let with_isbn = sample_job("Dup Test", Some("9780140449136"));
        let id = queue.insert(&with_isbn).await.unwrap();

        let dup = queue.find_duplicate(&with_isbn).await.unwrap();
        assert_eq!(dup, Some(id));

        let different_title_same_isbn = NewJob {
            title: "Completely Different".to_string(),
            ..with_isbn.clone()
        };
        assert!(queue
            .find_duplicate(&different_title_same_isbn)
            .await
            .unwrap()
            .is_some());
    }
}

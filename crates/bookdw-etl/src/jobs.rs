//! Data models for the enrichment job queue
//!
//! A job is one book enrichment request. Jobs move through
//! `pending -> processing -> {completed | failed}`; failed jobs stay
//! claimable until their retry count reaches the configured ceiling,
//! after which only a manual reset makes them eligible again. Jobs are
//! never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Job status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum JobStatus {
    #[serde(rename = "pending")]
    #[sqlx(rename = "pending")]
    Pending,
    #[serde(rename = "processing")]
    #[sqlx(rename = "processing")]
    Processing,
    #[serde(rename = "completed")]
    #[sqlx(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    #[sqlx(rename = "failed")]
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Enrichment job row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub status: JobStatus,
    pub retry_count: i32,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Check if the job has been permanently failed under the given ceiling
    pub fn is_exhausted(&self, retry_ceiling: i32) -> bool {
        self.status == JobStatus::Failed && self.retry_count >= retry_ceiling
    }
}

/// New job request, as produced by the CSV seeder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
}

/// Terminal failure classification for one job attempt
///
/// The variant determines the `error_detail` prefix stored on the job
/// row, so operators can tell failure classes apart with a `LIKE`
/// filter.
#[derive(Debug, Error)]
pub enum JobFailure {
    /// Neither source returned a record for this book.
    #[error("no data available: {0}")]
    NoData(String),

    /// An adapter ran out of transient retries.
    #[error("source exhausted: {0}")]
    SourceExhausted(String),

    /// An adapter failed permanently and the other source had nothing
    /// usable either.
    #[error("source permanent: {0}")]
    SourcePermanent(String),

    /// The reconciler rejected the fetched records.
    #[error("reconcile: {0}")]
    Reconcile(String),

    /// The warehouse transaction was rolled back.
    #[error("load: {0}")]
    Load(String),
}

impl JobFailure {
    /// Human-readable detail stored in the job row
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_job_status_from_str() {
        assert_eq!("pending".parse::<JobStatus>().unwrap(), JobStatus::Pending);
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_is_exhausted_boundary() {
        let mut job = Job {
            id: Uuid::new_v4(),
            title: "Crime and Punishment".to_string(),
            author: "Fyodor Dostoevsky".to_string(),
            isbn: None,
            status: JobStatus::Failed,
            retry_count: 2,
            error_detail: Some("source exhausted: google books".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!job.is_exhausted(3));

        job.retry_count = 3;
        assert!(job.is_exhausted(3));

        job.status = JobStatus::Pending;
        assert!(!job.is_exhausted(3));
    }

    #[test]
    fn test_failure_detail_prefixes() {
        let f = JobFailure::NoData("both sources returned no record".to_string());
        assert!(f.detail().starts_with("no data available:"));

        let f = JobFailure::SourceExhausted("google books: 3 attempts".to_string());
        assert!(f.detail().starts_with("source exhausted:"));

        let f = JobFailure::Reconcile("identity conflict".to_string());
        assert!(f.detail().starts_with("reconcile:"));

        let f = JobFailure::Load("unique violation on dim_books".to_string());
        assert!(f.detail().starts_with("load:"));
    }
}

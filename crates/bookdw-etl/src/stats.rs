//! Worker run statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one worker run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Jobs claimed this run
    pub jobs_claimed: i64,
    /// Jobs completed and committed
    pub jobs_completed: i64,
    /// Jobs failed but still below the retry ceiling
    pub jobs_marked_for_retry: i64,
    /// Jobs failed at the retry ceiling
    pub jobs_permanently_failed: i64,
    /// Successful Google Books fetches
    pub google_books_hits: i64,
    /// Failed or empty Google Books fetches
    pub google_books_misses: i64,
    /// Successful Open Library fetches
    pub open_library_hits: i64,
    /// Failed or empty Open Library fetches
    pub open_library_misses: i64,
    /// Scalar conflicts resolved during reconciliation
    pub conflicts_resolved: i64,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// End time
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark stats as completed
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }

    pub fn inc_completed(&mut self) {
        self.jobs_completed += 1;
    }

    pub fn inc_marked_for_retry(&mut self) {
        self.jobs_marked_for_retry += 1;
    }

    pub fn inc_permanently_failed(&mut self) {
        self.jobs_permanently_failed += 1;
    }

    /// Jobs per second over the run
    pub fn jobs_per_second(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.jobs_claimed as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Merge another run's counters into this one
    pub fn merge(&mut self, other: &WorkerStats) {
        self.jobs_claimed += other.jobs_claimed;
        self.jobs_completed += other.jobs_completed;
        self.jobs_marked_for_retry += other.jobs_marked_for_retry;
        self.jobs_permanently_failed += other.jobs_permanently_failed;
        self.google_books_hits += other.google_books_hits;
        self.google_books_misses += other.google_books_misses;
        self.open_library_hits += other.open_library_hits;
        self.open_library_misses += other.open_library_misses;
        self.conflicts_resolved += other.conflicts_resolved;
    }
}

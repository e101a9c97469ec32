//! Source adapters
//!
//! Each upstream catalog API is wrapped in a [`SourceAdapter`] that
//! turns a job's identity hint into a validated [`RawRecord`]. Adapters
//! classify their failures but never retry; the bounded retry loop
//! lives in [`fetch_with_retry`] so the policy is owned by the caller.

pub mod google_books;
pub mod open_library;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::warn;

pub use google_books::GoogleBooksAdapter;
pub use open_library::OpenLibraryAdapter;

/// Upstream catalog identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    GoogleBooks,
    OpenLibrary,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::GoogleBooks => write!(f, "google-books"),
            Source::OpenLibrary => write!(f, "open-library"),
        }
    }
}

impl std::error::Error for Source {}

/// What we know about the book before asking anyone
#[derive(Debug, Clone)]
pub struct IdentityHint {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
}

/// An author as reported by one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub name: String,
    /// Stable upstream key (Open Library author key), when the source has one
    pub external_key: Option<String>,
}

/// One source's view of a book, validated at the adapter boundary.
///
/// Every field is optional; the reconciler decides what survives the
/// merge. Untyped payload maps never leave the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub isbn13: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub page_count: Option<i32>,
    pub languages: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub authors: Vec<AuthorRef>,
    pub genres: Vec<String>,
    pub rating_avg: Option<f64>,
    pub rating_count: Option<i32>,
    pub list_price_amount: Option<f64>,
    pub retail_price_amount: Option<f64>,
    pub currency_code: Option<String>,
    pub is_ebook: Option<bool>,
    pub saleability: Option<String>,
    pub edition_count: Option<i32>,
}

/// Result of one successful adapter call
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Found(RawRecord),
    /// The source answered but has no record for this book. Not an error.
    NotFound,
}

/// Adapter failure classification
///
/// Transient failures (timeout, connect, 429, 5xx) are worth retrying;
/// permanent ones (undecodable payload, other 4xx) are not. `Exhausted`
/// is produced by [`fetch_with_retry`] once the attempt ceiling is hit
/// and always fails the job.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{source}: transient: {reason}")]
    Transient { source: Source, reason: String },

    #[error("{source}: permanent: {reason}")]
    Permanent { source: Source, reason: String },

    #[error("{source}: exhausted after {attempts} attempts: {last}")]
    Exhausted {
        source: Source,
        attempts: u32,
        last: String,
    },
}

impl AdapterError {
    pub fn source(&self) -> Source {
        match self {
            AdapterError::Transient { source, .. }
            | AdapterError::Permanent { source, .. }
            | AdapterError::Exhausted { source, .. } => *source,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient { .. })
    }
}

/// A catalog API wrapper
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// One fetch attempt. Never loops, never sleeps.
    async fn fetch(&self, hint: &IdentityHint) -> Result<FetchOutcome, AdapterError>;
}

/// Bounded retry policy for transient adapter failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based attempt that just failed).
    /// Doubles per attempt.
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run one adapter with bounded retry on transient failures.
///
/// Permanent failures and successful outcomes (including `NotFound`)
/// return immediately. Exceeding the ceiling yields
/// [`AdapterError::Exhausted`].
pub async fn fetch_with_retry(
    adapter: &dyn SourceAdapter,
    hint: &IdentityHint,
    policy: RetryPolicy,
) -> Result<FetchOutcome, AdapterError> {
    let mut last_reason = String::new();

    for attempt in 1..=policy.max_attempts {
        match adapter.fetch(hint).await {
            Ok(outcome) => return Ok(outcome),
            Err(AdapterError::Transient { source, reason }) => {
                warn!(
                    source = %source,
                    attempt,
                    max_attempts = policy.max_attempts,
                    reason = %reason,
                    "transient fetch failure"
                );
                last_reason = reason;
                if attempt < policy.max_attempts {
                    sleep(policy.backoff_for(attempt)).await;
                }
            },
            Err(err) => return Err(err),
        }
    }

    Err(AdapterError::Exhausted {
        source: adapter.source(),
        attempts: policy.max_attempts,
        last: last_reason,
    })
}

/// Map an HTTP status or transport error onto the adapter taxonomy.
///
/// Shared by both adapters: 404 means "no record", 429 and 5xx are
/// retryable, everything else in 4xx is a caller bug and permanent.
pub(crate) fn classify_status(
    source: Source,
    status: reqwest::StatusCode,
) -> Option<AdapterError> {
    if status.is_success() {
        return None;
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Some(AdapterError::Transient {
            source,
            reason: format!("HTTP {}", status.as_u16()),
        });
    }
    Some(AdapterError::Permanent {
        source,
        reason: format!("HTTP {}", status.as_u16()),
    })
}

pub(crate) fn classify_transport(source: Source, err: reqwest::Error) -> AdapterError {
    if err.is_timeout() || err.is_connect() {
        AdapterError::Transient {
            source,
            reason: err.to_string(),
        }
    } else if err.is_decode() {
        AdapterError::Permanent {
            source,
            reason: format!("undecodable payload: {}", err),
        }
    } else {
        AdapterError::Transient {
            source,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAdapter {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl SourceAdapter for FlakyAdapter {
        fn source(&self) -> Source {
            Source::GoogleBooks
        }

        async fn fetch(&self, _hint: &IdentityHint) -> Result<FetchOutcome, AdapterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(FetchOutcome::Found(RawRecord {
                    title: Some("Crime and Punishment".to_string()),
                    ..RawRecord::default()
                }))
            } else {
                Err(AdapterError::Transient {
                    source: Source::GoogleBooks,
                    reason: "HTTP 503".to_string(),
                })
            }
        }
    }

    struct AlwaysPermanent;

    #[async_trait]
    impl SourceAdapter for AlwaysPermanent {
        fn source(&self) -> Source {
            Source::OpenLibrary
        }

        async fn fetch(&self, _hint: &IdentityHint) -> Result<FetchOutcome, AdapterError> {
            Err(AdapterError::Permanent {
                source: Source::OpenLibrary,
                reason: "HTTP 400".to_string(),
            })
        }
    }

    fn hint() -> IdentityHint {
        IdentityHint {
            title: "Crime and Punishment".to_string(),
            author: "Fyodor Dostoevsky".to_string(),
            isbn: None,
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let adapter = FlakyAdapter {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let outcome = fetch_with_retry(&adapter, &hint(), fast_policy(3)).await;
        assert!(matches!(outcome, Ok(FetchOutcome::Found(_))));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_at_ceiling() {
        let adapter = FlakyAdapter {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        };
        let outcome = fetch_with_retry(&adapter, &hint(), fast_policy(3)).await;
        match outcome {
            Err(AdapterError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_short_circuits() {
        let outcome = fetch_with_retry(&AlwaysPermanent, &hint(), fast_policy(5)).await;
        assert!(matches!(outcome, Err(AdapterError::Permanent { .. })));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff: Duration::from_millis(250),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(Source::GoogleBooks, reqwest::StatusCode::OK).is_none());
        assert!(matches!(
            classify_status(Source::GoogleBooks, reqwest::StatusCode::SERVICE_UNAVAILABLE),
            Some(AdapterError::Transient { .. })
        ));
        assert!(matches!(
            classify_status(Source::GoogleBooks, reqwest::StatusCode::TOO_MANY_REQUESTS),
            Some(AdapterError::Transient { .. })
        ));
        assert!(matches!(
            classify_status(Source::GoogleBooks, reqwest::StatusCode::BAD_REQUEST),
            Some(AdapterError::Permanent { .. })
        ));
    }
}

//! Canonical book model
//!
//! The reconciler's output: one merged view of a book with every
//! conflict already resolved. This is the only shape the warehouse
//! loader accepts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A merged, deduplicated author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorIdentity {
    pub name: String,
    /// Upstream author key when any source supplied one
    pub external_key: Option<String>,
}

/// Point-in-time commerce and popularity metrics
///
/// Each field comes from exactly one authoritative source; values are
/// never averaged across catalogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub rating_avg: Option<f64>,
    pub rating_count: Option<i32>,
    pub edition_count: Option<i32>,
    pub list_price_amount: Option<f64>,
    pub retail_price_amount: Option<f64>,
    pub currency_code: Option<String>,
    /// Meaningful zero: an absent flag means "not an ebook"
    pub is_ebook: bool,
    pub saleability: Option<String>,
    /// Snapshot date (UTC) the metrics were observed
    pub as_of: NaiveDate,
}

/// The reconciled book
///
/// Identity and title are mandatory; everything else stays `None` when
/// no source knew it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalBook {
    /// Normalized 13-digit identifier
    pub isbn13: String,
    pub title: String,
    pub description: Option<String>,
    pub page_count: Option<i32>,
    /// Merged 2-letter language codes, sorted and deduplicated
    pub languages: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub authors: Vec<AuthorIdentity>,
    /// Normalized genre labels
    pub genres: Vec<String>,
    pub metrics: MetricsSnapshot,
}

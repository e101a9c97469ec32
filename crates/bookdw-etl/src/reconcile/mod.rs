//! Reconciliation engine
//!
//! Merges the per-source [`RawRecord`]s of one job into a single
//! [`CanonicalBook`]. Pure and deterministic: same inputs, same output,
//! no I/O. Conflicts between sources are resolved by the configured
//! primary source and reported back as [`ConflictRecord`]s rather than
//! hidden in a log call, so callers can audit and tests can assert.

pub mod text;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::canonical::{AuthorIdentity, CanonicalBook, MetricsSnapshot};
use crate::config::PrimarySource;
use crate::sources::RawRecord;
use text::{
    clean_genre, clean_publisher, clean_title, collapse_whitespace, dedup_key,
    normalize_isbn13, normalize_language, parse_published_date,
};

/// Merge configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilePolicy {
    /// Which source wins scalar conflicts
    pub primary: PrimarySource,
}

/// One resolved disagreement between the two sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub field: &'static str,
    pub primary: String,
    pub secondary: String,
    pub chosen: String,
}

/// Reconciliation failure, always fails the job
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("sources disagree on identity: google-books={google_books}, open-library={open_library}")]
    IdentityConflict {
        google_books: String,
        open_library: String,
    },

    #[error("no usable 13-digit identifier from any source or the job itself")]
    MissingIdentity,

    #[error("no title survived the merge")]
    MissingTitle,
}

/// The merge result: one canonical book plus the conflict audit trail
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub book: CanonicalBook,
    pub conflicts: Vec<ConflictRecord>,
}

/// Merge zero, one, or two source records into a canonical book.
///
/// `hint_isbn` is the identifier the job itself carried, used as the
/// identity of last resort when neither source reports one.
pub fn reconcile(
    google_books: Option<&RawRecord>,
    open_library: Option<&RawRecord>,
    hint_isbn: Option<&str>,
    policy: &ReconcilePolicy,
) -> Result<Reconciliation, ReconcileError> {
    let isbn13 = resolve_identity(google_books, open_library, hint_isbn)?;

    let (primary, secondary) = match policy.primary {
        PrimarySource::GoogleBooks => (google_books, open_library),
        PrimarySource::OpenLibrary => (open_library, google_books),
    };

    let mut conflicts = Vec::new();

    let title = merge_scalar(
        "title",
        primary.and_then(|r| r.title.as_deref()),
        secondary.and_then(|r| r.title.as_deref()),
        &mut conflicts,
    )
    .as_deref()
    .and_then(clean_title)
    .ok_or(ReconcileError::MissingTitle)?;

    let description = merge_scalar(
        "description",
        primary.and_then(|r| r.description.as_deref()),
        secondary.and_then(|r| r.description.as_deref()),
        &mut conflicts,
    );

    let publisher = merge_scalar(
        "publisher",
        primary.and_then(|r| r.publisher.as_deref()),
        secondary.and_then(|r| r.publisher.as_deref()),
        &mut conflicts,
    )
    .as_deref()
    .and_then(clean_publisher);

    let published_date = merge_scalar(
        "published_date",
        primary.and_then(|r| r.published_date.as_deref()),
        secondary.and_then(|r| r.published_date.as_deref()),
        &mut conflicts,
    )
    .as_deref()
    .and_then(parse_published_date);

    let page_count = merge_count(
        "page_count",
        primary.and_then(|r| r.page_count),
        secondary.and_then(|r| r.page_count),
        &mut conflicts,
    );

    let languages = merge_languages(primary, secondary);
    let authors = merge_authors(primary, secondary);
    let genres = merge_genres(primary, secondary);

    // Metrics are category-authoritative and ignore the primary-source
    // policy: commerce figures always come from Google Books, edition
    // count always from Open Library.
    let metrics = MetricsSnapshot {
        rating_avg: google_books.and_then(|r| r.rating_avg),
        rating_count: google_books.and_then(|r| r.rating_count),
        edition_count: open_library.and_then(|r| r.edition_count),
        list_price_amount: google_books.and_then(|r| r.list_price_amount),
        retail_price_amount: google_books.and_then(|r| r.retail_price_amount),
        currency_code: google_books.and_then(|r| r.currency_code.clone()),
        is_ebook: google_books.and_then(|r| r.is_ebook).unwrap_or(false),
        saleability: google_books.and_then(|r| r.saleability.clone()),
        as_of: Utc::now().date_naive(),
    };

    debug!(
        isbn13 = %isbn13,
        conflicts = conflicts.len(),
        authors = authors.len(),
        "reconciled book"
    );

    Ok(Reconciliation {
        book: CanonicalBook {
            isbn13,
            title,
            description,
            page_count,
            languages,
            publisher,
            published_date,
            authors,
            genres,
            metrics,
        },
        conflicts,
    })
}

fn resolve_identity(
    google_books: Option<&RawRecord>,
    open_library: Option<&RawRecord>,
    hint_isbn: Option<&str>,
) -> Result<String, ReconcileError> {
    let gb = google_books
        .and_then(|r| r.isbn13.as_deref())
        .and_then(normalize_isbn13);
    let ol = open_library
        .and_then(|r| r.isbn13.as_deref())
        .and_then(normalize_isbn13);

    match (gb, ol) {
        (Some(a), Some(b)) if a != b => Err(ReconcileError::IdentityConflict {
            google_books: a,
            open_library: b,
        }),
        (Some(a), _) => Ok(a),
        (None, Some(b)) => Ok(b),
        (None, None) => hint_isbn
            .and_then(normalize_isbn13)
            .ok_or(ReconcileError::MissingIdentity),
    }
}

/// Scalar precedence: single non-null wins; both non-null and differing
/// (after whitespace collapse, case kept) means the primary value wins
/// and the disagreement is recorded.
fn merge_scalar(
    field: &'static str,
    primary: Option<&str>,
    secondary: Option<&str>,
    conflicts: &mut Vec<ConflictRecord>,
) -> Option<String> {
    let primary = primary.map(collapse_whitespace).filter(|s| !s.is_empty());
    let secondary = secondary.map(collapse_whitespace).filter(|s| !s.is_empty());

    match (primary, secondary) {
        (None, None) => None,
        (Some(p), None) => Some(p),
        (None, Some(s)) => Some(s),
        (Some(p), Some(s)) => {
            if p != s {
                conflicts.push(ConflictRecord {
                    field,
                    primary: p.clone(),
                    secondary: s,
                    chosen: p.clone(),
                });
            }
            Some(p)
        },
    }
}

fn merge_count(
    field: &'static str,
    primary: Option<i32>,
    secondary: Option<i32>,
    conflicts: &mut Vec<ConflictRecord>,
) -> Option<i32> {
    match (primary, secondary) {
        (None, None) => None,
        (Some(p), None) => Some(p),
        (None, Some(s)) => Some(s),
        (Some(p), Some(s)) => {
            if p != s {
                conflicts.push(ConflictRecord {
                    field,
                    primary: p.to_string(),
                    secondary: s.to_string(),
                    chosen: p.to_string(),
                });
            }
            Some(p)
        },
    }
}

/// Union of both sources' language codes, normalized to 2 letters,
/// deduplicated and sorted.
fn merge_languages(primary: Option<&RawRecord>, secondary: Option<&RawRecord>) -> Vec<String> {
    let mut languages: Vec<String> = primary
        .into_iter()
        .chain(secondary)
        .flat_map(|r| r.languages.iter())
        .filter_map(|code| normalize_language(code))
        .collect();
    languages.sort();
    languages.dedup();
    languages
}

/// Union of both sources' authors, deduplicated by normalized name.
/// Display casing comes from the first occurrence; a keyed variant of
/// the same name fills in the key of an unkeyed one.
fn merge_authors(primary: Option<&RawRecord>, secondary: Option<&RawRecord>) -> Vec<AuthorIdentity> {
    let mut merged: Vec<AuthorIdentity> = Vec::new();

    for author in primary
        .into_iter()
        .chain(secondary)
        .flat_map(|r| r.authors.iter())
    {
        let name = collapse_whitespace(&author.name);
        if name.is_empty() {
            continue;
        }
        let key = dedup_key(&name);

        match merged.iter_mut().find(|a| dedup_key(&a.name) == key) {
            Some(existing) => {
                if existing.external_key.is_none() {
                    existing.external_key = author.external_key.clone();
                }
            },
            None => merged.push(AuthorIdentity {
                name,
                external_key: author.external_key.clone(),
            }),
        }
    }

    merged
}

/// Union of both sources' genre labels, normalized and deduplicated
fn merge_genres(primary: Option<&RawRecord>, secondary: Option<&RawRecord>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for genre in primary
        .into_iter()
        .chain(secondary)
        .flat_map(|r| r.genres.iter())
    {
        if let Some(cleaned) = clean_genre(genre) {
            if !merged.contains(&cleaned) {
                merged.push(cleaned);
            }
        }
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sources::AuthorRef;

    fn gb_record() -> RawRecord {
        RawRecord {
            isbn13: Some("9780140449136".to_string()),
            title: Some("Crime and Punishment".to_string()),
            description: Some("A novel of moral torment.".to_string()),
            page_count: Some(720),
            languages: vec!["en".to_string()],
            publisher: Some("Penguin Classics".to_string()),
            published_date: Some("2002-12-31".to_string()),
            authors: vec![AuthorRef {
                name: "Fyodor Dostoevsky".to_string(),
                external_key: None,
            }],
            genres: vec!["Fiction / Crime".to_string()],
            rating_avg: Some(4.5),
            rating_count: Some(1200),
            list_price_amount: Some(12.99),
            retail_price_amount: Some(9.99),
            currency_code: Some("USD".to_string()),
            is_ebook: Some(true),
            saleability: Some("FOR_SALE".to_string()),
            edition_count: None,
        }
    }

    fn ol_record() -> RawRecord {
        RawRecord {
            isbn13: Some("978-0-14-044913-6".to_string()),
            title: Some("Crime and Punishment".to_string()),
            description: None,
            page_count: Some(671),
            languages: vec!["eng".to_string(), "rus".to_string()],
            publisher: Some("Penguin".to_string()),
            published_date: Some("1866".to_string()),
            authors: vec![AuthorRef {
                name: "fyodor dostoevsky".to_string(),
                external_key: Some("OL22242A".to_string()),
            }],
            genres: vec!["Classics".to_string(), "crime".to_string()],
            rating_avg: None,
            rating_count: None,
            list_price_amount: None,
            retail_price_amount: None,
            currency_code: None,
            is_ebook: None,
            saleability: None,
            edition_count: Some(312),
        }
    }

    fn policy() -> ReconcilePolicy {
        ReconcilePolicy {
            primary: PrimarySource::GoogleBooks,
        }
    }

    #[test]
    fn test_merge_is_deterministic() {
        let gb = gb_record();
        let ol = ol_record();
        let a = reconcile(Some(&gb), Some(&ol), None, &policy()).unwrap();
        let b = reconcile(Some(&gb), Some(&ol), None, &policy()).unwrap();
        assert_eq!(a.book.isbn13, b.book.isbn13);
        assert_eq!(a.book.title, b.book.title);
        assert_eq!(a.book.authors, b.book.authors);
        assert_eq!(a.conflicts, b.conflicts);
    }

    #[test]
    fn test_full_merge_crime_and_punishment() {
        let gb = gb_record();
        let ol = ol_record();
        let result = reconcile(Some(&gb), Some(&ol), None, &policy()).unwrap();
        let book = &result.book;

        assert_eq!(book.isbn13, "9780140449136");
        assert_eq!(book.title, "Crime and Punishment");
        assert_eq!(book.description.as_deref(), Some("A novel of moral torment."));
        // Primary source wins the page-count disagreement.
        assert_eq!(book.page_count, Some(720));
        assert_eq!(book.languages, vec!["en", "ru"]);
        assert_eq!(book.publisher.as_deref(), Some("Penguin Classics"));
        assert_eq!(
            book.published_date,
            chrono::NaiveDate::from_ymd_opt(2002, 12, 31)
        );

        // One merged author, keyed from the Open Library variant.
        assert_eq!(book.authors.len(), 1);
        assert_eq!(book.authors[0].name, "Fyodor Dostoevsky");
        assert_eq!(book.authors[0].external_key.as_deref(), Some("OL22242A"));

        assert_eq!(book.genres, vec!["crime", "classics"]);

        // Commerce metrics from Google Books, edition count from Open Library.
        assert_eq!(book.metrics.rating_avg, Some(4.5));
        assert_eq!(book.metrics.edition_count, Some(312));
        assert!(book.metrics.is_ebook);

        // page_count, publisher, and published_date disagreed.
        let fields: Vec<_> = result.conflicts.iter().map(|c| c.field).collect();
        assert!(fields.contains(&"page_count"));
        assert!(fields.contains(&"publisher"));
        assert!(fields.contains(&"published_date"));
        assert!(!fields.contains(&"title"));
    }

    #[test]
    fn test_conflicting_titles_prefer_primary_and_log() {
        let gb = RawRecord {
            title: Some("Foo ".to_string()),
            ..gb_record()
        };
        let ol = RawRecord {
            title: Some("foo".to_string()),
            ..ol_record()
        };

        let result = reconcile(Some(&gb), Some(&ol), None, &policy()).unwrap();
        assert_eq!(result.book.title, "Foo");
        let conflict = result
            .conflicts
            .iter()
            .find(|c| c.field == "title")
            .unwrap();
        assert_eq!(conflict.primary, "Foo");
        assert_eq!(conflict.secondary, "foo");
        assert_eq!(conflict.chosen, "Foo");
    }

    #[test]
    fn test_primary_source_policy_flips_winner() {
        let gb = RawRecord {
            page_count: Some(720),
            ..gb_record()
        };
        let ol = RawRecord {
            page_count: Some(671),
            ..ol_record()
        };

        let flipped = ReconcilePolicy {
            primary: PrimarySource::OpenLibrary,
        };
        let result = reconcile(Some(&gb), Some(&ol), None, &flipped).unwrap();
        assert_eq!(result.book.page_count, Some(671));
        // Commerce metrics stay with Google Books regardless of policy.
        assert_eq!(result.book.metrics.rating_avg, Some(4.5));
    }

    #[test]
    fn test_identity_conflict_fails() {
        let gb = RawRecord {
            isbn13: Some("9780140449136".to_string()),
            ..gb_record()
        };
        let ol = RawRecord {
            isbn13: Some("9780553211757".to_string()),
            ..ol_record()
        };

        let err = reconcile(Some(&gb), Some(&ol), None, &policy()).unwrap_err();
        assert!(matches!(err, ReconcileError::IdentityConflict { .. }));
    }

    #[test]
    fn test_identity_falls_back_to_hint() {
        let gb = RawRecord {
            isbn13: None,
            ..gb_record()
        };
        let result =
            reconcile(Some(&gb), None, Some("978-0-14-044913-6"), &policy()).unwrap();
        assert_eq!(result.book.isbn13, "9780140449136");
    }

    #[test]
    fn test_missing_identity_fails() {
        let gb = RawRecord {
            isbn13: None,
            ..gb_record()
        };
        let err = reconcile(Some(&gb), None, None, &policy()).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingIdentity));
    }

    #[test]
    fn test_missing_title_fails() {
        let gb = RawRecord {
            title: None,
            ..gb_record()
        };
        let err = reconcile(Some(&gb), None, None, &policy()).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingTitle));
    }

    #[test]
    fn test_single_source_merge() {
        let ol = ol_record();
        let result = reconcile(None, Some(&ol), None, &policy()).unwrap();
        assert_eq!(result.book.isbn13, "9780140449136");
        assert_eq!(result.book.page_count, Some(671));
        assert!(result.conflicts.is_empty());
        // No Google Books record means no commerce metrics.
        assert!(result.book.metrics.rating_avg.is_none());
        assert!(!result.book.metrics.is_ebook);
        assert_eq!(result.book.metrics.edition_count, Some(312));
    }

    #[test]
    fn test_absent_stays_none() {
        let gb = RawRecord {
            description: None,
            publisher: None,
            ..gb_record()
        };
        let result = reconcile(Some(&gb), None, None, &policy()).unwrap();
        assert!(result.book.description.is_none());
        assert!(result.book.publisher.is_none());
    }
}

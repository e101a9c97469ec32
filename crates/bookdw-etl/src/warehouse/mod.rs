//! Dimensional warehouse loader
//!
//! Writes one [`CanonicalBook`] into the star schema as a single unit
//! of work: every statement for a job runs inside one transaction, and
//! the whole thing is wrapped in a timeout. A constraint violation or
//! timeout rolls everything back; partially-loaded books never exist.
//!
//! Load order matters for referential integrity:
//! dimensions first, then the book row, then bridges, then the fact.

pub mod dates;

use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::canonical::{AuthorIdentity, CanonicalBook, MetricsSnapshot};
use crate::reconcile::text::dedup_key;
use dates::DateDimension;

/// Load failure, always rolls back the job's transaction
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("load transaction exceeded {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Rows touched per table during one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub publishers: u64,
    pub authors: u64,
    pub genres: u64,
    pub dates: u64,
    pub books: u64,
    pub author_links: u64,
    pub genre_links: u64,
    pub facts: u64,
}

/// Loader over the warehouse schema
#[derive(Clone)]
pub struct WarehouseLoader {
    pool: PgPool,
    timeout: Duration,
}

impl WarehouseLoader {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Load one canonical book. Commits on success; any error or the
    /// timeout leaves the warehouse untouched.
    pub async fn load(&self, book: &CanonicalBook) -> Result<LoadSummary, LoadError> {
        match tokio::time::timeout(self.timeout, self.load_inner(book)).await {
            Ok(result) => result,
            // The dropped transaction rolls back on its own.
            Err(_) => Err(LoadError::Timeout(self.timeout)),
        }
    }

    async fn load_inner(&self, book: &CanonicalBook) -> Result<LoadSummary, LoadError> {
        let mut tx = self.pool.begin().await?;
        let mut summary = LoadSummary::default();

        // 1. Independent dimensions
        let publisher_id = match &book.publisher {
            Some(name) => {
                let id = upsert_publisher(&mut tx, name).await?;
                summary.publishers += 1;
                Some(id)
            },
            None => None,
        };

        let mut author_ids = Vec::with_capacity(book.authors.len());
        for author in &book.authors {
            author_ids.push(upsert_author(&mut tx, author).await?);
            summary.authors += 1;
        }

        let mut genre_ids = Vec::with_capacity(book.genres.len());
        for genre in &book.genres {
            genre_ids.push(upsert_genre(&mut tx, genre).await?);
            summary.genres += 1;
        }

        let published_date_key = match book.published_date {
            Some(date) => {
                let dim = DateDimension::derive(date);
                ensure_date(&mut tx, &dim).await?;
                summary.dates += 1;
                Some(dim.date_key)
            },
            None => None,
        };

        let snapshot = DateDimension::derive(book.metrics.as_of);
        ensure_date(&mut tx, &snapshot).await?;
        summary.dates += 1;

        // 2. Book row
        let book_id = upsert_book(&mut tx, book, publisher_id, published_date_key).await?;
        summary.books += 1;

        // 3. Bridges
        for author_id in &author_ids {
            link_author(&mut tx, book_id, *author_id).await?;
            summary.author_links += 1;
        }
        for genre_id in &genre_ids {
            link_genre(&mut tx, book_id, *genre_id).await?;
            summary.genre_links += 1;
        }

        // 4. Fact snapshot
        write_fact(&mut tx, book_id, &book.isbn13, snapshot.date_key, &book.metrics).await?;
        summary.facts += 1;

        tx.commit().await?;

        info!(
            isbn13 = %book.isbn13,
            authors = summary.authors,
            genres = summary.genres,
            "loaded book into warehouse"
        );

        Ok(summary)
    }
}

// ============================================================================
// Dimension upserts
// ============================================================================
//
// The concurrency-safe pattern for every dimension: attempt the insert
// with ON CONFLICT DO NOTHING RETURNING id; when another writer got
// there first, fall back to a lookup by natural key and COALESCE-fill
// any attributes the existing row is missing.

async fn upsert_publisher(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> Result<i64, sqlx::Error> {
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO dim_publisher (name)
        VALUES ($1)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(id) => Ok(id),
        None => {
            sqlx::query_scalar("SELECT id FROM dim_publisher WHERE name = $1")
                .bind(name)
                .fetch_one(&mut **tx)
                .await
        },
    }
}

async fn upsert_author(
    tx: &mut Transaction<'_, Postgres>,
    author: &AuthorIdentity,
) -> Result<i64, sqlx::Error> {
    let normalized = dedup_key(&author.name);

    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO dim_author (name, normalized_name, ol_author_key)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&author.name)
    .bind(&normalized)
    .bind(&author.external_key)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(id) = inserted {
        return Ok(id);
    }

    // Natural key: external key when we have one, else normalized name.
    let existing: i64 = match &author.external_key {
        Some(key) => {
            let by_key: Option<i64> =
                sqlx::query_scalar("SELECT id FROM dim_author WHERE ol_author_key = $1")
                    .bind(key)
                    .fetch_optional(&mut **tx)
                    .await?;
            match by_key {
                Some(id) => id,
                None => {
                    sqlx::query_scalar("SELECT id FROM dim_author WHERE normalized_name = $1")
                        .bind(&normalized)
                        .fetch_one(&mut **tx)
                        .await?
                },
            }
        },
        None => {
            sqlx::query_scalar("SELECT id FROM dim_author WHERE normalized_name = $1")
                .bind(&normalized)
                .fetch_one(&mut **tx)
                .await?
        },
    };

    // Fill in a newly-learned external key; never overwrite one.
    sqlx::query(
        r#"
        UPDATE dim_author
        SET ol_author_key = COALESCE(ol_author_key, $2), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(existing)
    .bind(&author.external_key)
    .execute(&mut **tx)
    .await?;

    Ok(existing)
}

async fn upsert_genre(
    tx: &mut Transaction<'_, Postgres>,
    label: &str,
) -> Result<i64, sqlx::Error> {
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO dim_genre (genre_name)
        VALUES ($1)
        ON CONFLICT (genre_name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(label)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(id) => Ok(id),
        None => {
            sqlx::query_scalar("SELECT id FROM dim_genre WHERE genre_name = $1")
                .bind(label)
                .fetch_one(&mut **tx)
                .await
        },
    }
}

async fn ensure_date(
    tx: &mut Transaction<'_, Postgres>,
    dim: &DateDimension,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO dim_date (
            date_key, full_date, year, month, day,
            quarter, day_of_week, is_weekend
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (date_key) DO NOTHING
        "#,
    )
    .bind(dim.date_key)
    .bind(dim.full_date)
    .bind(dim.year)
    .bind(dim.month)
    .bind(dim.day)
    .bind(&dim.quarter)
    .bind(&dim.day_of_week)
    .bind(dim.is_weekend)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_book(
    tx: &mut Transaction<'_, Postgres>,
    book: &CanonicalBook,
    publisher_id: Option<i64>,
    published_date_key: Option<i32>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO dim_books (
            isbn, title, description, page_count, languages,
            publisher_id, published_date_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (isbn) DO UPDATE SET
            title = EXCLUDED.title,
            description = COALESCE(EXCLUDED.description, dim_books.description),
            page_count = COALESCE(EXCLUDED.page_count, dim_books.page_count),
            languages = EXCLUDED.languages,
            publisher_id = COALESCE(EXCLUDED.publisher_id, dim_books.publisher_id),
            published_date_key = COALESCE(EXCLUDED.published_date_key, dim_books.published_date_key),
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(&book.isbn13)
    .bind(&book.title)
    .bind(&book.description)
    .bind(book.page_count)
    .bind(&book.languages)
    .bind(publisher_id)
    .bind(published_date_key)
    .fetch_one(&mut **tx)
    .await
}

async fn link_author(
    tx: &mut Transaction<'_, Postgres>,
    book_id: i64,
    author_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO book_author_bridge (book_id, author_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(book_id)
    .bind(author_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn link_genre(
    tx: &mut Transaction<'_, Postgres>,
    book_id: i64,
    genre_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO book_genre_bridge (book_id, genre_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(book_id)
    .bind(genre_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// One metrics row per (isbn, snapshot date); a re-run of the same job
/// on the same day supersedes its earlier snapshot.
async fn write_fact(
    tx: &mut Transaction<'_, Postgres>,
    book_id: i64,
    isbn: &str,
    snapshot_date_key: i32,
    metrics: &MetricsSnapshot,
) -> Result<(), sqlx::Error> {
    debug!(isbn = %isbn, snapshot_date_key, "writing fact snapshot");

    sqlx::query(
        r#"
        INSERT INTO fact_book_metrics (
            book_id, isbn, snapshot_date_key,
            rating_avg, rating_count, edition_count,
            list_price_amount, retail_price_amount, currency_code,
            is_ebook_available, saleability_status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (isbn, snapshot_date_key) DO UPDATE SET
            book_id = EXCLUDED.book_id,
            rating_avg = EXCLUDED.rating_avg,
            rating_count = EXCLUDED.rating_count,
            edition_count = EXCLUDED.edition_count,
            list_price_amount = EXCLUDED.list_price_amount,
            retail_price_amount = EXCLUDED.retail_price_amount,
            currency_code = EXCLUDED.currency_code,
            is_ebook_available = EXCLUDED.is_ebook_available,
            saleability_status = EXCLUDED.saleability_status,
            updated_at = NOW()
        "#,
    )
    .bind(book_id)
    .bind(isbn)
    .bind(snapshot_date_key)
    .bind(metrics.rating_avg)
    .bind(metrics.rating_count)
    .bind(metrics.edition_count)
    .bind(metrics.list_price_amount)
    .bind(metrics.retail_price_amount)
    .bind(&metrics.currency_code)
    .bind(metrics.is_ebook)
    .bind(&metrics.saleability)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

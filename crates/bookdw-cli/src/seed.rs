//! CSV seeding
//!
//! Reads a curated book list and inserts one pending job per valid,
//! non-duplicate row. Rows are validated independently; a bad row is
//! logged and skipped, never fatal for the rest of the file.

use anyhow::{Context, Result};
use bookdw_etl::{JobQueue, NewJob};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Counters for one seeding run
#[derive(Debug, Default)]
pub struct SeedSummary {
    pub inserted: u64,
    pub skipped_duplicates: u64,
    pub invalid: u64,
}

/// One CSV row as written in the curated list. The ISBN column is
/// optional and may be absent from the file entirely.
#[derive(Debug, Deserialize)]
struct SeedRow {
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Author", default)]
    author: String,
    #[serde(rename = "ISBN", default)]
    isbn: Option<String>,
}

impl SeedRow {
    /// Validate and trim the row into an insertable job.
    ///
    /// `row_num` is the 1-based file line, header included, so the
    /// first data row is 2.
    fn into_job(self, row_num: usize) -> Option<NewJob> {
        let title = self.title.trim();
        let author = self.author.trim();

        if title.is_empty() {
            warn!(row = row_num, "missing or empty title");
            return None;
        }
        if author.is_empty() {
            warn!(row = row_num, "missing or empty author");
            return None;
        }

        let isbn = self
            .isbn
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Some(NewJob {
            title: title.to_string(),
            author: author.to_string(),
            isbn,
        })
    }
}

/// Parse the CSV file, returning the valid jobs and the count of
/// rejected rows.
fn parse_csv(path: &Path) -> Result<(Vec<NewJob>, u64)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut jobs = Vec::new();
    let mut invalid = 0u64;

    for (idx, record) in reader.deserialize::<SeedRow>().enumerate() {
        let row_num = idx + 2;
        match record {
            Ok(row) => match row.into_job(row_num) {
                Some(job) => jobs.push(job),
                None => invalid += 1,
            },
            Err(e) => {
                warn!(row = row_num, error = %e, "malformed CSV row");
                invalid += 1;
            },
        }
    }

    Ok((jobs, invalid))
}

/// Seed pending jobs from the CSV at `path`.
///
/// Duplicates are detected against jobs already in the database,
/// keyed on ISBN when the row carries one and on (title, author)
/// otherwise.
pub async fn run(queue: &JobQueue, path: &Path) -> Result<SeedSummary> {
    let (jobs, invalid) = parse_csv(path)?;
    let mut summary = SeedSummary {
        invalid,
        ..SeedSummary::default()
    };

    for job in jobs {
        if let Some(existing) = queue.find_duplicate(&job).await? {
            warn!(
                title = %job.title,
                author = %job.author,
                existing_id = %existing,
                "skipping duplicate job"
            );
            summary.skipped_duplicates += 1;
            continue;
        }

        let id = queue.insert(&job).await?;
        debug!(job_id = %id, title = %job.title, "job seeded");
        summary.inserted += 1;
    }

    Ok(summary)
}

//! BookDW ETL Core
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The enrichment pipeline: claim queued book jobs, fetch metadata from
//! Google Books and Open Library concurrently, reconcile the two records
//! into one canonical book, and load it into the dimensional warehouse.
//!
//! # Pipeline phases
//!
//! 1. **Claim** ([`queue::JobQueue::claim`]) - atomic batch claim, safe
//!    across concurrent worker processes.
//! 2. **Extract** ([`sources`]) - both source adapters run concurrently
//!    with bounded retry on transient failures.
//! 3. **Reconcile** ([`reconcile`]) - pure, deterministic merge of the
//!    fetched records into a [`canonical::CanonicalBook`].
//! 4. **Load** ([`warehouse`]) - one transaction per job: dimension
//!    upserts, bridge links, fact snapshot.
//!
//! Each phase only runs if the previous one succeeded; every terminal
//! outcome is written back to the job row.

pub mod canonical;
pub mod config;
pub mod jobs;
pub mod queue;
pub mod reconcile;
pub mod sources;
pub mod stats;
pub mod warehouse;
pub mod worker;

pub use config::EtlConfig;
pub use jobs::{Job, JobStatus, NewJob};
pub use queue::JobQueue;
pub use worker::Worker;

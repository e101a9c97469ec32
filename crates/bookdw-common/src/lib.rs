//! BookDW Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the BookDW workspace.
//!
//! # Overview
//!
//! This crate provides the pieces every BookDW workspace member needs:
//!
//! - **Error Handling**: the workspace-wide error type and result alias
//! - **Logging**: tracing subscriber setup (console/file, text/JSON)
//!
//! # Example
//!
//! ```no_run
//! use bookdw_common::logging::{init_logging, LogConfig};
//!
//! fn start() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BookDwError, Result};

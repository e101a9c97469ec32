//! Configuration management

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/bookdw";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default number of jobs claimed per worker cycle.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Default job retry ceiling. A job failed this many times is no longer
/// claimable and needs a manual reset.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: i32 = 3;

/// Default per-adapter attempt ceiling for transient failures.
pub const DEFAULT_ADAPTER_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff between adapter attempts, in milliseconds.
/// Doubles on each retry.
pub const DEFAULT_ADAPTER_BACKOFF_MS: u64 = 250;

/// Default per-request timeout for source API calls, in seconds.
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 10;

/// Default warehouse load transaction timeout, in seconds.
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;

/// Default Google Books API base URL.
pub const DEFAULT_GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";

/// Default Open Library API base URL.
pub const DEFAULT_OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";

/// Which source wins when both report differing descriptive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PrimarySource {
    #[default]
    GoogleBooks,
    OpenLibrary,
}

impl FromStr for PrimarySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google-books" | "google_books" | "googlebooks" => Ok(PrimarySource::GoogleBooks),
            "open-library" | "open_library" | "openlibrary" => Ok(PrimarySource::OpenLibrary),
            _ => Err(anyhow::anyhow!("Invalid primary source: {}", s)),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub batch_size: i64,
    pub retry_max_attempts: i32,
    pub adapter_max_attempts: u32,
    pub adapter_backoff_ms: u64,
    pub adapter_timeout_secs: u64,
    pub load_timeout_secs: u64,
    pub primary_source: PrimarySource,
    pub google_books_base_url: String,
    pub open_library_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl EtlConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = EtlConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: std::env::var("DATABASE_IDLE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            batch_size: std::env::var("BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            retry_max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            adapter_max_attempts: std::env::var("ADAPTER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ADAPTER_MAX_ATTEMPTS),
            adapter_backoff_ms: std::env::var("ADAPTER_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ADAPTER_BACKOFF_MS),
            adapter_timeout_secs: std::env::var("ADAPTER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ADAPTER_TIMEOUT_SECS),
            load_timeout_secs: std::env::var("LOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_LOAD_TIMEOUT_SECS),
            primary_source: std::env::var("PRIMARY_SOURCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            google_books_base_url: std::env::var("GOOGLE_BOOKS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_BOOKS_BASE_URL.to_string()),
            open_library_base_url: std::env::var("OPEN_LIBRARY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPEN_LIBRARY_BASE_URL.to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.batch_size <= 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.retry_max_attempts <= 0 {
            anyhow::bail!("Retry max attempts must be greater than 0");
        }

        if self.adapter_max_attempts == 0 {
            anyhow::bail!("Adapter max attempts must be greater than 0");
        }

        if self.google_books_base_url.is_empty() || self.open_library_base_url.is_empty() {
            anyhow::bail!("Source base URLs cannot be empty");
        }

        Ok(())
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            batch_size: DEFAULT_BATCH_SIZE,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            adapter_max_attempts: DEFAULT_ADAPTER_MAX_ATTEMPTS,
            adapter_backoff_ms: DEFAULT_ADAPTER_BACKOFF_MS,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            primary_source: PrimarySource::GoogleBooks,
            google_books_base_url: DEFAULT_GOOGLE_BOOKS_BASE_URL.to_string(),
            open_library_base_url: DEFAULT_OPEN_LIBRARY_BASE_URL.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.primary_source, PrimarySource::GoogleBooks);
    }

    #[test]
    fn test_primary_source_from_str() {
        assert_eq!(
            "google-books".parse::<PrimarySource>().unwrap(),
            PrimarySource::GoogleBooks
        );
        assert_eq!(
            "OPEN_LIBRARY".parse::<PrimarySource>().unwrap(),
            PrimarySource::OpenLibrary
        );
        assert!("amazon".parse::<PrimarySource>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pool_bounds() {
        let mut config = EtlConfig::default();
        config.database.min_connections = 20;
        config.database.max_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = EtlConfig {
            batch_size: 0,
            ..EtlConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

//! Common error types for ACT ingest

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for ACT operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the ACT crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config could not be parsed
    #[error("TOML error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A date value that does not normalize to a calendar date
    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    /// Invalid input at an ingestion boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Atomic replace of a persisted file failed; the previous file is untouched
    #[error("Atomic write to {path} failed: {source}")]
    AtomicWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

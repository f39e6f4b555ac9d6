//! Error types for the symbol store and configuration.
//!
//! The language-server client has its own taxonomy in
//! [`LspError`](crate::lsp::LspError); this module covers everything that
//! touches disk.
//!
//! ## Retry semantics
//!
//! Storage failures are classified before they reach callers:
//! - Corruption triggers an automatic backup-and-recreate, then the operation
//!   is retried. Only a failed recreation surfaces, as [`Error::RecoveryFailed`].
//! - Transient failures (busy, locked, I/O) are retried with backoff and only
//!   surface as [`Error::RetriesExhausted`] once every attempt has failed.
//! - Everything else (constraint violations, bad data) surfaces immediately
//!   as [`Error::Database`].

use std::path::PathBuf;

use thiserror::Error;

/// Result type for store and configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for storage and configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation was issued without a repository scope
    #[error("repository_id is required and must not be empty")]
    MissingRepositoryId,

    /// The database file is corrupted
    #[error("database at {} is corrupted: {reason}", path.display())]
    Corrupted {
        /// Database file.
        path: PathBuf,
        /// What `SQLite` reported.
        reason: String,
    },

    /// The database was corrupted and could not be recreated
    #[error("failed to recover corrupted database at {}: {source}", path.display())]
    RecoveryFailed {
        /// Database file.
        path: PathBuf,
        /// Why recreation failed.
        #[source]
        source: Box<Error>,
    },

    /// A transient failure persisted through every attempt
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Store operation that was retried.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        source: rusqlite::Error,
    },

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// Input rejected before reaching the database
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Internal invariant violated (e.g. a poisoned lock)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` if the failure came from the database layer and a later
    /// retry by the caller might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Io(_))
    }
}

//! Retry loop and corruption recovery for mutating store operations.

use std::path::PathBuf;

use rusqlite::{Connection, ErrorCode};
use tracing::{error, info, warn};

use super::{sidecar, SymbolStore};
use crate::error::{Error, Result};

/// How the retry loop treats a `rusqlite` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// The file is damaged; back it up and start over.
    Corruption,
    /// Likely to succeed on a fresh connection after a pause.
    Transient,
    /// Retrying would fail the same way.
    Permanent,
}

/// Classify a `rusqlite` failure by its primary `SQLite` result code.
pub(crate) fn classify(err: &rusqlite::Error) -> ErrorClass {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => ErrorClass::Corruption,
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::DiskFull
            | ErrorCode::OutOfMemory,
        ) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

impl SymbolStore {
    /// Run a mutating operation with classification-driven retries.
    ///
    /// `f` may run more than once, so it must be safe to repeat: each call
    /// should do its work inside its own transaction or as one statement.
    ///
    /// - Transient failures drop the connection, sleep `retry_backoff`, and
    ///   try again, up to `max_retries` attempts in total.
    /// - Corruption moves the file aside, recreates the schema, and retries
    ///   on the empty database without consuming an attempt. A second
    ///   corruption in the same call is reported as [`Error::Corrupted`].
    /// - Anything else is returned immediately.
    pub(crate) fn with_retry<T, F>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> rusqlite::Result<T>,
    {
        let attempts = self.options.max_retries.max(1);
        let mut attempt = 0;
        let mut recovered = false;

        loop {
            attempt += 1;
            let mut slot = self.lock()?;
            let err = match Self::ensure_connected(&mut slot, &self.path, &self.options)
                .and_then(|conn| f(conn))
            {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match classify(&err) {
                ErrorClass::Permanent => return Err(err.into()),
                ErrorClass::Corruption if recovered => {
                    *slot = None;
                    return Err(Error::Corrupted {
                        path: self.path.clone(),
                        reason: err.to_string(),
                    });
                }
                ErrorClass::Corruption => {
                    warn!(
                        path = %self.path.display(),
                        operation,
                        error = %err,
                        "Database corruption detected; recreating"
                    );
                    self.recover(&mut slot)?;
                    recovered = true;
                    attempt -= 1;
                }
                ErrorClass::Transient => {
                    *slot = None;
                    drop(slot);
                    if attempt >= attempts {
                        return Err(Error::RetriesExhausted {
                            operation,
                            attempts,
                            source: err,
                        });
                    }
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "Transient database failure; retrying"
                    );
                    std::thread::sleep(self.options.retry_backoff);
                }
            }
        }
    }

    /// Move the damaged file aside and install a fresh database in `slot`.
    fn recover(&self, slot: &mut Option<Connection>) -> Result<()> {
        *slot = None;
        let fresh = self
            .quarantine()
            .and_then(|backup| {
                Self::connect(&self.path, &self.options)
                    .map(|conn| (backup, conn))
                    .map_err(Error::from)
            });

        match fresh {
            Ok((backup, conn)) => {
                *slot = Some(conn);
                info!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    "Recreated corrupted database"
                );
                Ok(())
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to recover corrupted database");
                Err(Error::RecoveryFailed {
                    path: self.path.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Rename the database to `<file>.corrupt` and remove its sidecars.
    fn quarantine(&self) -> Result<PathBuf> {
        let backup = sidecar(&self.path, ".corrupt");
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        super::remove_file_if_exists(&sidecar(&self.path, "-wal"))?;
        super::remove_file_if_exists(&sidecar(&self.path, "-shm"))?;
        Ok(backup)
    }
}

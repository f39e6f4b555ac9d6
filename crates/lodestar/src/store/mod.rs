//! `SQLite` storage for indexed symbols and the comment-reply ledger.
//!
//! One database file per deployment. Every row carries a `repository_id` and
//! every read takes one, so repositories sharing a file never see each
//! other's data.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `retry` - Error classification, retry loop, corruption recovery
//! - `symbols` - Symbol CRUD operations
//! - `replies` - Comment-reply ledger
//!
//! ## Connection discipline
//!
//! | Setting        | Value          |
//! |----------------|----------------|
//! | `journal_mode` | `WAL`          |
//! | `synchronous`  | `NORMAL`       |
//! | `foreign_keys` | `ON`           |
//! | `busy_timeout` | configurable   |
//!
//! The connection is cached behind a `Mutex` and dropped after any transient
//! failure, so the next operation reconnects.

mod helpers;
mod replies;
mod retry;
mod schema;
mod symbols;

pub(crate) use helpers::{
    like_pattern, limit_to_i64, now_millis, require_repository, row_to_reply, row_to_symbol,
    REPLIES_COLUMNS, SYMBOLS_COLUMNS,
};
pub(crate) use retry::{classify, ErrorClass};
pub(crate) use schema::{SCHEMA, SCHEMA_VERSION};

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default number of rows written per transaction by `insert_symbols`.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of attempts for a mutating operation.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Default time `SQLite` waits on a locked database before reporting busy.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for [`SymbolStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Rows per transaction in bulk inserts.
    pub batch_size: usize,
    /// Attempts per mutating operation, including the first.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_backoff: Duration,
    /// `SQLite` busy handler timeout.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl StoreOptions {
    /// Reject settings that would make the store unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero batch size or zero retries.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// `SQLite`-backed symbol store.
///
/// Safe to share across threads; operations serialize on the connection lock.
#[derive(Debug)]
pub struct SymbolStore {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
    options: StoreOptions,
}

impl SymbolStore {
    /// Open or create the store with default options.
    ///
    /// # Errors
    ///
    /// See [`SymbolStore::open_with_options`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, StoreOptions::default())
    }

    /// Open or create the store.
    ///
    /// Creates the parent directory if needed. A corrupted file is moved
    /// aside to `<file>.corrupt` and replaced with an empty database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid options, [`Error::RecoveryFailed`]
    /// if a corrupted file cannot be replaced, or the underlying failure if
    /// the database cannot be opened.
    pub fn open_with_options(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            conn: Mutex::new(None),
            path,
            options,
        };
        store.with_retry("open", |_| Ok(()))?;

        debug!(path = %store.path.display(), "Opened symbol store");
        Ok(store)
    }

    /// Database file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options the store was opened with.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether the database is reachable and passes `PRAGMA quick_check`.
    ///
    /// Never fails; problems are logged and reported as `false`.
    pub fn health_check(&self) -> bool {
        let report = self.with_connection(|conn| {
            conn.query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
        });
        match report {
            Ok(report) if report == "ok" => true,
            Ok(report) => {
                warn!(path = %self.path.display(), report = %report, "Database integrity check failed");
                false
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Database health check failed");
                false
            }
        }
    }

    /// Delete the database file and reopen with a fresh schema.
    ///
    /// Removes the file entirely rather than deleting rows, so an outdated
    /// schema does not survive.
    ///
    /// # Errors
    ///
    /// Returns an error if the old files cannot be removed or the new
    /// database cannot be created. The store reconnects on its next use.
    pub fn reset(&self) -> Result<()> {
        info!(path = %self.path.display(), "Resetting database");

        let mut conn = self.lock()?;
        // Close before deleting to release SQLite file locks.
        *conn = None;

        remove_file_if_exists(&self.path)?;
        remove_file_if_exists(&sidecar(&self.path, "-wal"))?;
        remove_file_if_exists(&sidecar(&self.path, "-shm"))?;

        let fresh = Self::connect(&self.path, &self.options).inspect_err(|e| {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to reopen database after reset"
            );
        })?;
        *conn = Some(fresh);
        debug!(path = %self.path.display(), "Database reset complete");
        Ok(())
    }

    /// Run a read against the cached connection, without retries.
    ///
    /// A non-permanent failure drops the connection so the next call
    /// reconnects.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut slot = self.lock()?;
        let result =
            Self::ensure_connected(&mut slot, &self.path, &self.options).and_then(|conn| f(conn));
        if let Err(e) = &result {
            if classify(e) != ErrorClass::Permanent {
                *slot = None;
            }
        }
        result.map_err(Into::into)
    }

    /// Acquire the connection lock.
    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Return the cached connection, opening one if there is none.
    fn ensure_connected<'a>(
        slot: &'a mut Option<Connection>,
        path: &Path,
        options: &StoreOptions,
    ) -> rusqlite::Result<&'a mut Connection> {
        let conn = match slot.take() {
            Some(conn) => conn,
            None => Self::connect(path, options)?,
        };
        Ok(slot.insert(conn))
    }

    /// Open a connection, apply pragmas, and ensure the schema exists.
    fn connect(path: &Path, options: &StoreOptions) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(options.busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION],
        )?;
        Ok(conn)
    }
}

/// `SQLite` names sidecars by appending to the full filename
/// (`index.db-wal`), so `Path::with_extension` would be wrong here.
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a file, ignoring `NotFound` errors (the file may not exist).
fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete database file");
            Err(Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to delete {}: {e}", path.display()),
            )))
        }
    }
}

//! Comment-reply ledger.
//!
//! Records which review comments have been answered so a bot never replies
//! twice. Entries expire through [`SymbolStore::cleanup_old_replies`].

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{require_repository, row_to_reply, SymbolStore, REPLIES_COLUMNS};
use crate::error::Result;
use crate::types::CommentReply;

impl SymbolStore {
    /// Record a reply now. Returns `false` if it was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn record_reply(&self, comment_id: i64, pr_number: i64, repository_id: &str) -> Result<bool> {
        self.record_reply_at(comment_id, pr_number, repository_id, Utc::now())
    }

    /// Record a reply with an explicit timestamp. Returns `false` if it was
    /// already recorded; the original timestamp is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn record_reply_at(
        &self,
        comment_id: i64,
        pr_number: i64,
        repository_id: &str,
        replied_at: DateTime<Utc>,
    ) -> Result<bool> {
        require_repository(repository_id)?;
        let inserted = self.with_retry("record_reply", |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO comment_replies (comment_id, pr_number, repository_id, replied_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![comment_id, pr_number, repository_id, replied_at.timestamp_millis()],
            )
        })?;
        Ok(inserted == 1)
    }

    /// Whether a reply to this comment has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn has_replied(&self, comment_id: i64, pr_number: i64, repository_id: &str) -> Result<bool> {
        Ok(self.get_reply(comment_id, pr_number, repository_id)?.is_some())
    }

    /// The recorded reply, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn get_reply(
        &self,
        comment_id: i64,
        pr_number: i64,
        repository_id: &str,
    ) -> Result<Option<CommentReply>> {
        require_repository(repository_id)?;
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {REPLIES_COLUMNS} FROM comment_replies \
                     WHERE comment_id = ?1 AND pr_number = ?2 AND repository_id = ?3"
                ),
                params![comment_id, pr_number, repository_id],
                row_to_reply,
            )
            .optional()
        })
    }

    /// Delete ledger entries older than `max_age`, across all repositories.
    /// Returns the number removed.
    ///
    /// An age reaching past the representable time range keeps every entry;
    /// a negative one that overflows removes every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails after retries.
    pub fn cleanup_old_replies(&self, max_age: TimeDelta) -> Result<usize> {
        let cutoff = Utc::now().checked_sub_signed(max_age).map_or_else(
            || if max_age < TimeDelta::zero() { i64::MAX } else { i64::MIN },
            |cutoff| cutoff.timestamp_millis(),
        );
        let removed = self.with_retry("cleanup_old_replies", |conn| {
            conn.execute("DELETE FROM comment_replies WHERE replied_at < ?1", [cutoff])
        })?;
        debug!(removed, max_age_secs = max_age.num_seconds(), "Cleaned up old replies");
        Ok(removed)
    }
}

//! Row conversion and parsing utilities.
//!
//! Timestamps are stored as unix milliseconds.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

use crate::error::{Error, Result};
use crate::types::{CommentReply, Symbol, SymbolId, SymbolKind};

/// SQL column list for the symbols table.
///
/// Use with `row_to_symbol` for consistent column ordering.
pub(crate) const SYMBOLS_COLUMNS: &str =
    "id, name, kind, file_path, line_number, column_number, repository_id, docstring, \
     parent_id, end_line_number, end_column_number, created_at, updated_at";

/// SQL column list for the `comment_replies` table.
pub(crate) const REPLIES_COLUMNS: &str = "comment_id, pr_number, repository_id, replied_at";

/// Parse a symbol kind string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_symbol_kind(idx: usize, s: &str) -> rusqlite::Result<SymbolKind> {
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!(
                "Unknown symbol kind '{s}' in database. Database may be corrupted or from a newer version."
            )
            .into(),
        )
    })
}

/// Convert stored milliseconds back into a timestamp.
pub(crate) fn parse_timestamp(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {millis} is out of range").into(),
        )
    })
}

/// Current time in the stored representation.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a database row to a `Symbol`.
///
/// Expects columns in `SYMBOLS_COLUMNS` order.
pub(crate) fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(2)?;
    Ok(Symbol {
        id: SymbolId::from(row.get::<_, i64>(0)?),
        name: row.get(1)?,
        kind: parse_symbol_kind(2, &kind)?,
        file_path: row.get(3)?,
        line_number: row.get(4)?,
        column_number: row.get(5)?,
        repository_id: row.get(6)?,
        docstring: row.get(7)?,
        parent_id: row.get::<_, Option<i64>>(8)?.map(SymbolId::from),
        end_line_number: row.get(9)?,
        end_column_number: row.get(10)?,
        created_at: parse_timestamp(11, row.get(11)?)?,
        updated_at: parse_timestamp(12, row.get(12)?)?,
    })
}

/// Convert a database row to a `CommentReply`.
///
/// Expects columns in `REPLIES_COLUMNS` order.
pub(crate) fn row_to_reply(row: &rusqlite::Row) -> rusqlite::Result<CommentReply> {
    Ok(CommentReply {
        comment_id: row.get(0)?,
        pr_number: row.get(1)?,
        repository_id: row.get(2)?,
        replied_at: parse_timestamp(3, row.get(3)?)?,
    })
}

/// Escape `LIKE` wildcards so `query` matches literally, and wrap it for a
/// substring match. Pair with `ESCAPE '\'`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Reject reads and deletes that are not scoped to a repository.
pub(crate) fn require_repository(repository_id: &str) -> Result<()> {
    if repository_id.trim().is_empty() {
        return Err(Error::MissingRepositoryId);
    }
    Ok(())
}

/// SQLite takes `LIMIT` as `i64`; larger values mean "no limit".
pub(crate) fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

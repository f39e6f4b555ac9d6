//! Symbol CRUD operations.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use super::{
    like_pattern, limit_to_i64, now_millis, require_repository, row_to_symbol, SymbolStore,
    SYMBOLS_COLUMNS,
};
use crate::error::Result;
use crate::types::{Symbol, SymbolData, SymbolId, SymbolKind, SymbolUpdate};

/// Insert-or-update on the occurrence key. `RETURNING` yields the row id in
/// both cases.
const UPSERT_SYMBOL: &str = "
    INSERT INTO symbols (name, kind, file_path, line_number, column_number, repository_id,
                         docstring, parent_id, end_line_number, end_column_number,
                         created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
    ON CONFLICT (name, file_path, repository_id, line_number, column_number) DO UPDATE SET
        kind = excluded.kind,
        docstring = excluded.docstring,
        parent_id = excluded.parent_id,
        end_line_number = excluded.end_line_number,
        end_column_number = excluded.end_column_number,
        updated_at = excluded.updated_at
    RETURNING id";

fn upsert(conn: &Connection, data: &SymbolData, now: i64) -> rusqlite::Result<SymbolId> {
    let mut stmt = conn.prepare_cached(UPSERT_SYMBOL)?;
    stmt.query_row(
        params![
            data.name,
            data.kind.as_str(),
            data.file_path,
            data.line_number,
            data.column_number,
            data.repository_id,
            data.docstring,
            data.parent_id.map(SymbolId::as_i64),
            data.end_line_number,
            data.end_column_number,
            now,
        ],
        |row| row.get::<_, i64>(0).map(SymbolId::from),
    )
}

impl SymbolStore {
    /// Insert a symbol, or update it if the same occurrence already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository and a database error if `parent_id` does not
    /// exist.
    pub fn insert_symbol(&self, data: &SymbolData) -> Result<SymbolId> {
        require_repository(&data.repository_id)?;
        self.with_retry("insert_symbol", |conn| upsert(conn, data, now_millis()))
    }

    /// Insert many symbols, `batch_size` rows per transaction.
    ///
    /// Each batch commits on its own and is retried on its own. If a batch
    /// fails, the remaining batches are skipped and the error is returned;
    /// batches that already committed stay in the database.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// before writing anything if any row has a blank repository.
    pub fn insert_symbols(&self, symbols: &[SymbolData]) -> Result<usize> {
        for data in symbols {
            require_repository(&data.repository_id)?;
        }

        let mut written = 0;
        for (batch, chunk) in symbols.chunks(self.options.batch_size).enumerate() {
            written += self.with_retry("insert_symbols", |conn| {
                let tx = conn.transaction()?;
                let now = now_millis();
                for data in chunk {
                    upsert(&tx, data, now)?;
                }
                tx.commit()?;
                Ok(chunk.len())
            })?;
            trace!(batch, rows = chunk.len(), "Committed symbol batch");
        }

        debug!(rows = written, "Inserted symbols");
        Ok(written)
    }

    /// Apply a partial update. Returns `false` if no symbol with `id` exists
    /// in `repository_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn update_symbol(
        &self,
        repository_id: &str,
        id: SymbolId,
        update: &SymbolUpdate,
    ) -> Result<bool> {
        require_repository(repository_id)?;
        if update.is_empty() {
            return Ok(self.get_symbol(repository_id, id)?.is_some());
        }

        let changed = self.with_retry("update_symbol", |conn| {
            conn.execute(
                "UPDATE symbols SET
                    kind = COALESCE(?1, kind),
                    docstring = COALESCE(?2, docstring),
                    line_number = COALESCE(?3, line_number),
                    column_number = COALESCE(?4, column_number),
                    end_line_number = COALESCE(?5, end_line_number),
                    end_column_number = COALESCE(?6, end_column_number),
                    parent_id = COALESCE(?7, parent_id),
                    updated_at = ?8
                 WHERE id = ?9 AND repository_id = ?10",
                params![
                    update.kind.map(|k| k.as_str()),
                    update.docstring,
                    update.line_number,
                    update.column_number,
                    update.end_line_number,
                    update.end_column_number,
                    update.parent_id.map(SymbolId::as_i64),
                    now_millis(),
                    id.as_i64(),
                    repository_id,
                ],
            )
        })?;
        Ok(changed > 0)
    }

    /// Search symbols whose name contains `query`.
    ///
    /// Matching is a case-insensitive substring match with `%`, `_` and `\`
    /// taken literally. Exact name matches come first, then names in
    /// ascending order. An empty query matches every name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn search_symbols(
        &self,
        repository_id: &str,
        query: &str,
        kind: Option<SymbolKind>,
        limit: usize,
    ) -> Result<Vec<Symbol>> {
        require_repository(repository_id)?;
        trace!(repository_id, query, kind = ?kind, limit, "Searching symbols");

        let pattern = like_pattern(query);
        self.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SYMBOLS_COLUMNS} FROM symbols \
                 WHERE repository_id = ?1 \
                   AND name LIKE ?2 ESCAPE '\\' \
                   AND (?3 IS NULL OR kind = ?3) \
                 ORDER BY CASE WHEN name = ?4 THEN 0 ELSE 1 END, name, file_path, line_number \
                 LIMIT ?5"
            ))?;
            stmt.query_map(
                params![
                    repository_id,
                    pattern,
                    kind.map(|k| k.as_str()),
                    query,
                    limit_to_i64(limit)
                ],
                row_to_symbol,
            )?
            .collect()
        })
    }

    /// All symbols in one file, in source order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn get_symbols_by_file(&self, file_path: &str, repository_id: &str) -> Result<Vec<Symbol>> {
        require_repository(repository_id)?;
        self.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SYMBOLS_COLUMNS} FROM symbols \
                 WHERE file_path = ?1 AND repository_id = ?2 \
                 ORDER BY line_number, column_number"
            ))?;
            stmt.query_map(params![file_path, repository_id], row_to_symbol)?
                .collect()
        })
    }

    /// Get a symbol by its database ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn get_symbol(&self, repository_id: &str, id: SymbolId) -> Result<Option<Symbol>> {
        require_repository(repository_id)?;
        trace!(symbol_id = %id, "Looking up symbol by ID");
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {SYMBOLS_COLUMNS} FROM symbols WHERE id = ?1 AND repository_id = ?2"
                ),
                params![id.as_i64(), repository_id],
                row_to_symbol,
            )
            .optional()
        })
    }

    /// Symbols whose parent is `parent_id`, in source order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn get_children(&self, repository_id: &str, parent_id: SymbolId) -> Result<Vec<Symbol>> {
        require_repository(repository_id)?;
        self.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SYMBOLS_COLUMNS} FROM symbols \
                 WHERE parent_id = ?1 AND repository_id = ?2 \
                 ORDER BY line_number, column_number"
            ))?;
            stmt.query_map(params![parent_id.as_i64(), repository_id], row_to_symbol)?
                .collect()
        })
    }

    /// Number of symbols stored for a repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn count_symbols(&self, repository_id: &str) -> Result<usize> {
        require_repository(repository_id)?;
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM symbols WHERE repository_id = ?1",
                [repository_id],
                |row| row.get(0),
            )
        })
    }

    /// Delete every symbol in one file. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn delete_symbols_by_file(&self, file_path: &str, repository_id: &str) -> Result<usize> {
        require_repository(repository_id)?;
        let removed = self.with_retry("delete_symbols_by_file", |conn| {
            conn.execute(
                "DELETE FROM symbols WHERE file_path = ?1 AND repository_id = ?2",
                params![file_path, repository_id],
            )
        })?;
        debug!(file_path, repository_id, removed, "Deleted file symbols");
        Ok(removed)
    }

    /// Delete every symbol of a repository in one statement. Returns the
    /// number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryId`](crate::Error::MissingRepositoryId)
    /// for a blank repository.
    pub fn delete_symbols_by_repository(&self, repository_id: &str) -> Result<usize> {
        require_repository(repository_id)?;
        let removed = self.with_retry("delete_symbols_by_repository", |conn| {
            conn.execute(
                "DELETE FROM symbols WHERE repository_id = ?1",
                [repository_id],
            )
        })?;
        debug!(repository_id, removed, "Deleted repository symbols");
        Ok(removed)
    }
}

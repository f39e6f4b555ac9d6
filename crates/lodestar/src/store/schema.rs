//! Database schema definition for the symbol store.

/// Version recorded in `schema_meta` when a database is created.
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Database schema definition.
pub(crate) const SCHEMA: &str = r"
-- Symbol definitions, one row per occurrence
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_number INTEGER NOT NULL,
    column_number INTEGER NOT NULL,
    repository_id TEXT NOT NULL,
    docstring TEXT,
    parent_id INTEGER REFERENCES symbols(id) ON DELETE SET NULL,
    end_line_number INTEGER,
    end_column_number INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_symbols_occurrence
    ON symbols(name, file_path, repository_id, line_number, column_number);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_repository ON symbols(repository_id);
CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path, repository_id);
CREATE INDEX IF NOT EXISTS idx_symbols_name_repository ON symbols(name, repository_id);
CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_id);

-- Review comments already answered
CREATE TABLE IF NOT EXISTS comment_replies (
    comment_id INTEGER NOT NULL,
    pr_number INTEGER NOT NULL,
    repository_id TEXT NOT NULL,
    replied_at INTEGER NOT NULL,
    UNIQUE (comment_id, pr_number, repository_id)
);

CREATE INDEX IF NOT EXISTS idx_comment_replies_replied_at ON comment_replies(replied_at);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

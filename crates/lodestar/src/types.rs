//! Domain types for the symbol store.
//!
//! - **Entities**: [`Symbol`], [`CommentReply`] (rows as read back)
//! - **Inputs**: [`SymbolData`], [`SymbolUpdate`] (what callers write)
//!
//! Every entity is scoped by a `repository_id`; two repositories may hold
//! identical file paths and names without ever seeing each other's rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A strongly-typed symbol ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub i64);

impl SymbolId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for SymbolId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of Python symbols the indexer records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// `class` definition
    Class,
    /// Module-level function
    Function,
    /// Instance method
    Method,
    /// `@property` getter
    Property,
    /// `@classmethod`
    Classmethod,
    /// `@staticmethod`
    Staticmethod,
    /// `@x.setter`
    Setter,
    /// `@x.deleter`
    Deleter,
    /// Assignment target
    Variable,
    /// UPPER_CASE assignment target
    Constant,
    /// A module (file)
    Module,
}

impl SymbolKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Class,
        Self::Function,
        Self::Method,
        Self::Property,
        Self::Classmethod,
        Self::Staticmethod,
        Self::Setter,
        Self::Deleter,
        Self::Variable,
        Self::Constant,
        Self::Module,
    ];

    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Property => "property",
            Self::Classmethod => "classmethod",
            Self::Staticmethod => "staticmethod",
            Self::Setter => "setter",
            Self::Deleter => "deleter",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Module => "module",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidData(format!("unknown symbol kind '{s}'")))
    }
}

/// A source range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Starting line
    pub start_line: u32,
    /// Starting column
    pub start_column: u32,
    /// Ending line (inclusive)
    pub end_line: u32,
    /// Ending column (exclusive)
    pub end_column: u32,
}

impl Span {
    /// Create a new span with validation.
    ///
    /// Returns `None` if the end position is before the start position.
    #[must_use]
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Option<Self> {
        if end_line < start_line || (end_line == start_line && end_column < start_column) {
            return None;
        }
        Some(Self {
            start_line,
            start_column,
            end_line,
            end_column,
        })
    }
}

/// A symbol as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Database id
    pub id: SymbolId,
    /// Unqualified name
    pub name: String,
    /// What kind of definition this is
    pub kind: SymbolKind,
    /// Path relative to the repository root
    pub file_path: String,
    /// Definition line
    pub line_number: u32,
    /// Definition column
    pub column_number: u32,
    /// Owning repository
    pub repository_id: String,
    /// Docstring, if any
    pub docstring: Option<String>,
    /// Enclosing symbol (class for methods, etc.)
    pub parent_id: Option<SymbolId>,
    /// End of the definition body
    pub end_line_number: Option<u32>,
    /// End column of the definition body
    pub end_column_number: Option<u32>,
    /// First insertion
    pub created_at: DateTime<Utc>,
    /// Last insert or update
    pub updated_at: DateTime<Utc>,
}

impl Symbol {
    /// The full definition range, when the end position is known.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        self.end_line_number
            .zip(self.end_column_number)
            .and_then(|(end_line, end_column)| {
                Span::new(self.line_number, self.column_number, end_line, end_column)
            })
    }
}

/// Data required to insert a symbol.
///
/// `(name, file_path, repository_id, line_number, column_number)` identifies
/// an occurrence; inserting the same occurrence again updates it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolData {
    /// Unqualified name
    pub name: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Path relative to the repository root
    pub file_path: String,
    /// Definition line
    pub line_number: u32,
    /// Definition column
    pub column_number: u32,
    /// Owning repository
    pub repository_id: String,
    /// Docstring
    pub docstring: Option<String>,
    /// Enclosing symbol
    pub parent_id: Option<SymbolId>,
    /// End of the definition body
    pub end_line_number: Option<u32>,
    /// End column of the definition body
    pub end_column_number: Option<u32>,
}

impl SymbolData {
    /// Minimal symbol with no docstring, parent, or end position.
    #[must_use]
    pub fn new(
        repository_id: impl Into<String>,
        file_path: impl Into<String>,
        name: impl Into<String>,
        kind: SymbolKind,
        line_number: u32,
        column_number: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            file_path: file_path.into(),
            line_number,
            column_number,
            repository_id: repository_id.into(),
            docstring: None,
            parent_id: None,
            end_line_number: None,
            end_column_number: None,
        }
    }

    /// Attach a docstring.
    #[must_use]
    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    /// Attach the enclosing symbol.
    #[must_use]
    pub fn with_parent(mut self, parent_id: SymbolId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Attach the end position of the definition body.
    #[must_use]
    pub fn with_end(mut self, end_line_number: u32, end_column_number: u32) -> Self {
        self.end_line_number = Some(end_line_number);
        self.end_column_number = Some(end_column_number);
        self
    }
}

/// Partial update for an existing symbol. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolUpdate {
    /// New kind
    pub kind: Option<SymbolKind>,
    /// New docstring
    pub docstring: Option<String>,
    /// New definition line
    pub line_number: Option<u32>,
    /// New definition column
    pub column_number: Option<u32>,
    /// New end line
    pub end_line_number: Option<u32>,
    /// New end column
    pub end_column_number: Option<u32>,
    /// New parent
    pub parent_id: Option<SymbolId>,
}

impl SymbolUpdate {
    /// Whether the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One entry in the comment-reply ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReply {
    /// Review comment id
    pub comment_id: i64,
    /// Pull request number
    pub pr_number: i64,
    /// Owning repository
    pub repository_id: String,
    /// When the reply was recorded
    pub replied_at: DateTime<Utc>,
}

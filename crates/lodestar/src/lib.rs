//! # Lodestar: language-server navigation and symbol indexing for Python
//!
//! Lodestar drives a Python language server (`pylsp` or `pyright`) for precise
//! navigation queries and keeps a `SQLite` index of the symbols found in each
//! repository. It is a library for review bots and indexing services.
//!
//! ## Components
//!
//! - [`lsp`] - async JSON-RPC client: framing, lifecycle, request correlation,
//!   server process supervision
//! - [`SymbolStore`] - repository-scoped symbol storage with retries and
//!   corruption recovery
//! - [`config`] - YAML configuration feeding both
//! - [`logging`] - optional `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lodestar::lsp::{path_to_uri, LspClient};
//! use lodestar::{LodestarConfig, SymbolData, SymbolKind, SymbolStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LodestarConfig::load("lodestar.yaml".as_ref()).await?;
//! lodestar::logging::init(&config.logging);
//!
//! let store = SymbolStore::open_with_options(&config.store.path, config.store_options())?;
//! store.insert_symbol(&SymbolData::new("acme/api", "app/models.py", "User", SymbolKind::Class, 12, 0))?;
//! let hits = store.search_symbols("acme/api", "user", None, 20)?;
//!
//! let client = LspClient::new(Arc::new(config.provider()?), "/src/acme-api", config.client_options());
//! client.start().await?;
//! let uri = path_to_uri("/src/acme-api/app/models.py".as_ref())?;
//! let definition = client.get_definition(&uri, hits[0].line_number - 1, 6).await?;
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod logging;
pub mod lsp;
mod store;
mod types;

pub use config::{LodestarConfig, LoggingConfig, LspConfig, StoreConfig};
pub use error::{Error, Result};
pub use store::{
    StoreOptions, SymbolStore, DEFAULT_BATCH_SIZE, DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_BACKOFF,
};
pub use types::{CommentReply, Span, Symbol, SymbolData, SymbolId, SymbolKind, SymbolUpdate};

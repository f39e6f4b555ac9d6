//! Async Language Server Protocol client.
//!
//! This module launches a language server (`pylsp` or `pyright`), speaks
//! JSON-RPC to it over stdio or a loopback socket, and exposes the navigation
//! queries the indexer needs.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use lodestar::lsp::{path_to_uri, AnyProvider, ClientOptions, LspClient, ServerKind};
//!
//! # async fn run() -> lodestar::lsp::Result<()> {
//! let provider = AnyProvider::from_kind(ServerKind::Pyright, None)?;
//! let client = Arc::new(LspClient::new(
//!     Arc::new(provider),
//!     "/path/to/project",
//!     ClientOptions::default(),
//! ));
//! client.start().await?;
//!
//! let uri = path_to_uri("/path/to/project/app.py".as_ref())?;
//! let hover = client.get_hover(&uri, 3, 8).await?;
//!
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! - Uses `lsp-types` for all protocol payloads
//! - JSON-RPC format: `Content-Length: N\r\n\r\n{json}`
//! - One reader task per session; responses are matched by id only
//! - Request ids are incrementing integers unless the caller supplies one

mod capabilities;
mod client;
mod error;
mod framing;
mod message;
mod pending;
mod process;
mod provider;
mod state;
mod transport;
mod uri;

pub use capabilities::{
    client_capabilities, error_codes, has_capability, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_INITIALIZE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use client::{ClientOptions, LspClient, NotificationHandler, RequestOptions};
pub use error::LspError;
pub use framing::{Decoded, FrameBuffer, FrameError, Framer, DEFAULT_MAX_BODY_LEN};
pub use message::{
    Message, MessageError, Notification, Request, RequestId, Response, ResponseError,
};
pub use process::{ExitOutcome, ServerProcess, ShutdownTimeouts};
pub use provider::{
    AnyProvider, LspProvider, PylspProvider, PyrightProvider, ServerKind, Transport, LOCALHOST,
};
pub use state::ClientState;
pub use uri::path_to_uri;

/// Result type for LSP operations.
pub type Result<T> = std::result::Result<T, LspError>;

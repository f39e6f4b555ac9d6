//! Protocol constants and the capability set this client advertises.

use std::time::Duration;

use lsp_types::{
    ClientCapabilities, DocumentSymbolClientCapabilities, DynamicRegistrationClientCapabilities,
    GotoCapability, HoverClientCapabilities, MarkupKind, TextDocumentClientCapabilities,
    TextDocumentSyncClientCapabilities, WindowClientCapabilities, WorkspaceClientCapabilities,
};
use serde_json::Value;

/// JSON-RPC protocol version sent on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Name reported in `clientInfo`.
pub const CLIENT_NAME: &str = "lodestar";

/// Default deadline for ordinary requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for `initialize`. Servers may index the workspace first.
pub const DEFAULT_INITIALIZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default deadline for the `shutdown` request.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time to keep retrying a TCP connect while the server binds.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Size of each read from the server's output stream.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// JSON-RPC error codes used by the client.
pub mod error_codes {
    /// The requested method does not exist or is not handled.
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

/// Capabilities sent in `initialize`.
///
/// Covers what the query API consumes: hover content formats, location links
/// for definitions, and hierarchical document symbols. Workspace configuration
/// and progress are declared because the client answers those server requests.
#[must_use]
pub fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            configuration: Some(true),
            workspace_folders: Some(true),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(false),
                did_save: Some(false),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        window: Some(WindowClientCapabilities {
            work_done_progress: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Whether an `InitializeResult` advertises `capability`.
///
/// A capability counts as present when its key exists under `capabilities`
/// and is neither `null` nor `false`.
#[must_use]
pub fn has_capability(initialize_result: &Value, capability: &str) -> bool {
    initialize_result
        .get("capabilities")
        .and_then(|caps| caps.get(capability))
        .is_some_and(|value| !matches!(value, Value::Null | Value::Bool(false)))
}

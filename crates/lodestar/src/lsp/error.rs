//! Error types for the language-server client.

use std::time::Duration;

use thiserror::Error;

use super::framing::FrameError;
use super::message::{MessageError, RequestId};
use super::state::ClientState;

/// Errors that can occur while talking to a language server.
#[derive(Debug, Error)]
pub enum LspError {
    /// Failed to spawn the language-server process.
    #[error("failed to spawn language server '{command}': {source}")]
    SpawnFailed {
        /// The command that failed to spawn.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Language-server executable not found.
    #[error("{command} not found\n\n{install_hint}")]
    NotFound {
        /// The command that was not found.
        command: String,
        /// Installation instructions for the missing command.
        install_hint: String,
    },

    /// I/O error on the server's streams.
    #[error("LSP communication error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not open the TCP connection to a socket-mode server.
    #[error("failed to connect to language server at {address}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        address: String,
        /// The last connection error.
        #[source]
        source: std::io::Error,
    },

    /// The server closed its output stream or the session was torn down.
    #[error("language server exited unexpectedly")]
    ServerExited,

    /// A frame could not be decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A decoded payload was not a routable JSON-RPC message.
    #[error("malformed JSON-RPC message: {0}")]
    Message(#[from] MessageError),

    /// Failed to serialize request parameters.
    #[error("failed to serialize LSP request: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Failed to deserialize a response payload.
    #[error("failed to deserialize LSP response: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// No response arrived before the request deadline.
    #[error("request {id} ({method}) timed out after {after:?}")]
    Timeout {
        /// Method of the timed-out request.
        method: String,
        /// Id of the timed-out request.
        id: RequestId,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The server answered with an error object.
    #[error("LSP error {code}: {message}")]
    ServerError {
        /// The JSON-RPC error code.
        code: i64,
        /// The error message from the server.
        message: String,
    },

    /// The request was cancelled before a response arrived.
    #[error("request {id} was cancelled")]
    Cancelled {
        /// Id of the cancelled request.
        id: RequestId,
    },

    /// A caller-supplied id is already awaiting a response.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),

    /// A query was issued outside the `Initialized` state.
    #[error("language server is not initialized (state: {state})")]
    NotInitialized {
        /// The state the client was in.
        state: ClientState,
    },

    /// A lifecycle operation was attempted from a state that does not allow it.
    #[error("invalid client state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: ClientState,
        /// Requested state.
        to: ClientState,
    },

    /// Initialize handshake failed.
    #[error("LSP initialize handshake failed: {0}")]
    InitializeFailed(String),

    /// The server did not advertise a capability the backend requires.
    #[error("{server} did not advertise required capability '{capability}'")]
    MissingCapability {
        /// Backend name.
        server: String,
        /// Capability key under `capabilities`.
        capability: String,
    },

    /// The configured transport is not usable for this backend.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Invalid file path for an LSP operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl LspError {
    /// Create a "not found" error with an install hint.
    #[must_use]
    pub fn not_found(command: &str, install_hint: &str) -> Self {
        Self::NotFound {
            command: command.to_string(),
            install_hint: install_hint.to_string(),
        }
    }

    /// Create a spawn failed error.
    #[must_use]
    pub fn spawn_failed(command: &str, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            command: command.to_string(),
            source,
        }
    }

    /// Create a server error from a JSON-RPC error response.
    #[must_use]
    pub fn server_error(code: i64, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Whether the error means the session itself is unusable.
    ///
    /// Transport errors move the client to `Error`; request and protocol
    /// errors only fail the call that produced them.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. }
                | Self::NotFound { .. }
                | Self::Io(_)
                | Self::Connect { .. }
                | Self::ServerExited
        )
    }
}

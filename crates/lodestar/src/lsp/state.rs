//! Connection state machine.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::error::LspError;
use super::Result;

/// Lifecycle state of an [`LspClient`](super::LspClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// No server process or streams.
    Disconnected,
    /// Spawning the server or dialling its socket.
    Connecting,
    /// Streams open, read loop running, handshake not started.
    Connected,
    /// `initialize` sent, awaiting its result.
    Initializing,
    /// Handshake complete; queries are accepted.
    Initialized,
    /// `shutdown`/`exit` sent, tearing down.
    ShuttingDown,
    /// Transport failed; only `stop()` is meaningful.
    Error,
}

impl ClientState {
    /// Whether the fixed transition table allows `self -> next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ClientState::{
            Connected, Connecting, Disconnected, Error, Initialized, Initializing, ShuttingDown,
        };

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connected, Initializing)
                | (Initializing, Initialized)
                | (Connected | Initialized | Error, ShuttingDown)
                | (ShuttingDown | Error, Disconnected)
                | (
                    Connecting | Connected | Initializing | Initialized | ShuttingDown,
                    Error
                )
        )
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared, checked holder of the current [`ClientState`].
#[derive(Debug)]
pub(crate) struct StateCell {
    inner: Mutex<ClientState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ClientState::Disconnected),
        }
    }

    pub(crate) fn get(&self) -> ClientState {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` if the table allows it.
    pub(crate) fn transition(&self, next: ClientState) -> Result<()> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(LspError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        debug!(from = %*state, to = %next, "LSP client state change");
        *state = next;
        Ok(())
    }

    /// Move to `Error` unless the session is already being torn down.
    ///
    /// Returns `true` if the state changed.
    pub(crate) fn fail(&self) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.can_transition_to(ClientState::Error) && *state != ClientState::ShuttingDown {
            debug!(from = %*state, "LSP client entering error state");
            *state = ClientState::Error;
            true
        } else {
            false
        }
    }

    /// Set the state unconditionally. Used by teardown paths that must end in
    /// a known state regardless of what failed on the way.
    pub(crate) fn force(&self, next: ClientState) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(from = %*state, to = %next, "LSP client state reset");
            *state = next;
        }
    }
}

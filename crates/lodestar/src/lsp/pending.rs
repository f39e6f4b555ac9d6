//! Correlation table for requests awaiting a response.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::trace;

use super::error::LspError;
use super::message::RequestId;
use super::Result;

/// Outcome delivered to the waiting caller.
pub(crate) type Outcome = std::result::Result<Value, LspError>;

/// One in-flight request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) method: String,
    pub(crate) deadline: Instant,
    sender: oneshot::Sender<Outcome>,
}

impl PendingRequest {
    fn resolve(self, outcome: Outcome) {
        // The receiver is gone only if the caller was dropped mid-await.
        let _ = self.sender.send(outcome);
    }
}

/// Requests keyed by id. Each entry resolves at most once and is removed the
/// moment it does.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, PendingRequest>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` and return the receiving half of its slot.
    pub(crate) fn register(
        &self,
        id: RequestId,
        method: &str,
        deadline: Instant,
    ) -> Result<oneshot::Receiver<Outcome>> {
        let mut pending = self.lock();
        if pending.contains_key(&id) {
            return Err(LspError::DuplicateRequestId(id));
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                deadline,
                sender,
            },
        );
        Ok(receiver)
    }

    /// Deliver `outcome` to the request with `id`. Returns `false` if no such
    /// request is pending (late response after timeout, or unknown id).
    pub(crate) fn resolve(&self, id: &RequestId, outcome: Outcome) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(request) => {
                trace!(
                    %id,
                    method = %request.method,
                    remaining = ?request.deadline.saturating_duration_since(Instant::now()),
                    "resolving pending request"
                );
                request.resolve(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` without notifying anyone.
    pub(crate) fn remove(&self, id: &RequestId) -> Option<PendingRequest> {
        self.lock().remove(id)
    }

    /// Resolve `id` with [`LspError::Cancelled`].
    pub(crate) fn cancel(&self, id: &RequestId) -> bool {
        self.resolve(id, Err(LspError::Cancelled { id: id.clone() }))
    }

    /// Resolve every entry with `Cancelled`. Returns how many were pending.
    pub(crate) fn cancel_all(&self) -> usize {
        self.fail_all(|id| LspError::Cancelled { id: id.clone() })
    }

    /// Resolve every entry with an error built by `make_error`.
    pub(crate) fn fail_all(&self, make_error: impl Fn(&RequestId) -> LspError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (id, request) in drained {
            let error = make_error(&id);
            request.resolve(Err(error));
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &RequestId) -> bool {
        self.lock().contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Removes a pending entry when the awaiting future finishes or is dropped.
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, id: RequestId) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

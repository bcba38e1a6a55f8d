//! # Pending-Request Table
//!
//! Correlates outgoing async requests with the responses that eventually come
//! back. An entry lives from send until its response arrives; there is no
//! timeout at this layer, so an entry whose peer never answers stays forever
//! unless the caller removes it.

use dashmap::DashMap;
use neowire::CorrelationId;
use serde_json::Value;
use tokio::sync::oneshot;

#[derive(Default)]
pub struct PendingTable {
    entries: DashMap<CorrelationId, oneshot::Sender<Value>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns the receiver its response will complete.
    pub fn register(&self, id: CorrelationId) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        rx
    }

    /// Completes and removes the entry for `id`.
    ///
    /// Returns false if nothing was waiting on `id` (late, duplicate or
    /// abandoned), which is harmless.
    pub fn resolve(&self, id: CorrelationId, value: Value) -> bool {
        let Some((_, tx)) = self.entries.remove(&id) else {
            tracing::debug!(%id, "dropping response with no pending request");
            return false;
        };
        // the caller may have stopped waiting
        let _ = tx.send(value);
        true
    }

    /// Removes the entry for `id` without completing it.
    pub fn forget(&self, id: CorrelationId) {
        self.entries.remove(&id);
    }

    /// Forgets `id` when the returned guard drops. Forgetting an entry that
    /// was already resolved is a no-op.
    pub fn guard(&self, id: CorrelationId) -> PendingGuard<'_> {
        PendingGuard { table: self, id }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes its entry when dropped, so a request abandoned mid-wait leaves
/// nothing behind.
pub struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}

use std::sync::Arc;

use tokio::sync::watch;

use super::graph::{CacheTagGraph, QuerySnapshot};
use super::CacheKey;

/// A live reference to one cache entry. Dropping it releases the reference.
pub struct Subscription {
    graph: Arc<CacheTagGraph>,
    key: CacheKey,
    entry_id: u64,
    receiver: watch::Receiver<QuerySnapshot>,
}

impl Subscription {
    pub(crate) fn new(
        graph: Arc<CacheTagGraph>,
        key: CacheKey,
        entry_id: u64,
        receiver: watch::Receiver<QuerySnapshot>,
    ) -> Self {
        Self {
            graph,
            key,
            entry_id,
            receiver,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the entry is gone (cache reset).
    pub async fn changed(&mut self) -> Option<QuerySnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("entry_id", &self.entry_id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.graph.unsubscribe(&self.key, self.entry_id);
    }
}

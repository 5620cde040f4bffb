//! Abort signal tables.
//!
//! One-shot cancellation tokens keyed by investigation task id or chat trace
//! id. The HTTP facade sets a token; workers observe it at every suspension
//! point. Tables are process-scoped and intentionally not persisted.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Outcome of a cancel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Token was set by this call.
    Signalled,
    /// Token had already been set.
    AlreadySignalled,
    /// No live entry under that key.
    NotFound,
}

/// Registry of one-shot abort tokens. `K` is the key type: `Uuid` for
/// investigations, `String` for chat trace ids.
pub struct AbortRegistry<K: std::hash::Hash + Eq + Clone> {
    entries: DashMap<K, CancellationToken>,
}

impl<K: std::hash::Hash + Eq + Clone> Default for AbortRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: std::hash::Hash + Eq + Clone> AbortRegistry<K> {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Register a fresh token for a worker. Replaces any stale entry under
    /// the same key.
    pub fn register(&self, key: K) -> CancellationToken {
        let token = CancellationToken::new();
        self.entries.insert(key, token.clone());
        token
    }

    /// Set the abort token.
    pub fn cancel(&self, key: &K) -> CancelOutcome {
        match self.entries.get(key) {
            Some(entry) => {
                if entry.is_cancelled() {
                    CancelOutcome::AlreadySignalled
                } else {
                    entry.cancel();
                    CancelOutcome::Signalled
                }
            }
            None => CancelOutcome::NotFound,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove the entry when the worker exits. The token itself stays valid
    /// for any clone still held.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Number of live entries; doubles as the "currently streaming" metric.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

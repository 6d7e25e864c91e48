//! Per-invocation key-to-id memoization for reference resolution

use std::collections::HashMap;
use std::sync::Mutex;

use keysync_store::{RecordStore, ResourceKind, Result as StoreResult};

/// Caches the store id for every `(kind, external key)` pair looked up
/// during one sync invocation.
///
/// Entries are created on first successful lookup and never evicted,
/// so at most one store lookup happens per distinct key per kind per
/// run. The cache is owned by a single invocation and must not be
/// shared across runs: cached ids would go stale relative to
/// concurrent external changes.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    entries: Mutex<HashMap<(ResourceKind, String), String>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached id for a key, if a previous lookup succeeded.
    pub fn get(&self, kind: ResourceKind, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(&(kind, key.to_string()))
            .cloned()
    }

    /// Record a key-to-id mapping, e.g. from a batch fetch.
    pub fn prime(&self, kind: ResourceKind, key: impl Into<String>, id: impl Into<String>) {
        self.entries
            .lock()
            .unwrap()
            .insert((kind, key.into()), id.into());
    }

    /// Resolve a key to an id, hitting the store only on cache miss.
    ///
    /// Returns `None` when the store has no record with that key; the
    /// miss is not cached, so a later run of the same key would look
    /// it up again (within one run the resolver reports the miss to
    /// the caller instead of retrying).
    pub async fn resolve<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        kind: ResourceKind,
        key: &str,
    ) -> StoreResult<Option<String>> {
        if let Some(id) = self.get(kind, key) {
            return Ok(Some(id));
        }

        let looked_up = store.lookup_id_by_key(kind, key).await?;
        if let Some(id) = &looked_up {
            self.prime(kind, key, id.clone());
        }
        Ok(looked_up)
    }
}

//! The record-store seam the reconciliation engine works against

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Draft, ExistingRecord, QueryPredicate, ResourceKind, UpdateAction};

/// Primitive operations a remote record store must expose.
///
/// Implementations own all transport concerns: authentication, retry,
/// backoff and rate limiting never surface to callers beyond a failed
/// `Result`. All methods must be safe to call from concurrent tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point lookup of a record's store id by its external key.
    ///
    /// Must be idempotent and side-effect free; returns `None` when no
    /// record of that kind carries the key.
    async fn lookup_id_by_key(&self, kind: ResourceKind, key: &str) -> Result<Option<String>>;

    /// One page of records matching the predicate, in stable order.
    ///
    /// Callers drive offset-based pagination themselves; a page
    /// shorter than `limit` signals the end of the result set.
    async fn query_page(
        &self,
        kind: ResourceKind,
        predicate: &QueryPredicate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ExistingRecord>>;

    /// Create a record from a draft whose references are resolved.
    async fn create_record(&self, draft: &Draft) -> Result<ExistingRecord>;

    /// Apply an ordered list of update actions to an existing record.
    async fn update_record(
        &self,
        kind: ResourceKind,
        id: &str,
        actions: &[UpdateAction],
    ) -> Result<ExistingRecord>;
}

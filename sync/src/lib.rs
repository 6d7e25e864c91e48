//! Keysync Reconciliation Engine
//!
//! An async library that converges the state of a remote record store
//! to caller-supplied desired state, producing the minimal set of
//! update actions per record:
//! - Reference resolution with per-invocation key-to-id caching
//! - Field-by-field diffing into ordered update actions
//! - Custom-field diff dispatch per resource kind
//! - Offset-paginated batch retrieval
//! - Per-record failure isolation with run statistics

pub mod cache;
pub mod custom;
pub mod diff;
pub mod error;
pub mod fetcher;
pub mod options;
pub mod resolver;
pub mod stats;
pub mod sync_engine;

// Re-export main types and functions
pub use cache::ReferenceCache;
pub use custom::{CustomActionBuilder, CustomFieldActionBuilder};
pub use diff::build_actions;
pub use error::{Result, SyncError};
pub use fetcher::{fetch_matching_by_keys, query_all, DEFAULT_PAGE_SIZE};
pub use options::{ErrorCallback, SyncOptions, SyncOptionsBuilder, WarningCallback};
pub use resolver::ReferenceResolver;
pub use stats::{SyncStatistics, SyncStatisticsBuilder};
pub use sync_engine::RecordSync;

// Re-export the store seam so callers need only one crate.
pub use keysync_store as store;
pub use keysync_store::{
    Draft, ExistingRecord, QueryPredicate, RecordStore, Reference, ResourceKind, UpdateAction,
};

/// Synchronize a batch of drafts against a record store.
pub async fn sync_records<S: RecordStore + ?Sized>(
    store: &S,
    drafts: &[Draft],
    options: SyncOptions,
) -> Result<SyncStatistics> {
    let engine = RecordSync::new(store, options);
    engine.sync(drafts).await
}

#[cfg(test)]
mod sync_tests;

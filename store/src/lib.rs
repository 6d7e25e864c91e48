//! Record-store client for the keysync reconciliation engine
//!
//! This crate holds the seam between the engine and the remote store:
//! the shared data model (drafts, existing records, references,
//! update actions), the async `RecordStore` trait, an HTTP-backed
//! implementation with retry/backoff, and an in-memory implementation
//! for tests and dry runs.

pub mod error;
pub mod http;
pub mod memory;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use error::{Result, StoreError};
pub use http::{HttpRecordStore, HttpRecordStoreBuilder, ListResult};
pub use memory::InMemoryRecordStore;
pub use store::RecordStore;
pub use types::{
    CustomFields, CustomFieldsDraft, Draft, ExistingRecord, LocalizedText, QueryPredicate,
    Reference, ResourceKind, UpdateAction,
};

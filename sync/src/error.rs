//! Error types for the reconciliation engine

use keysync_store::{ResourceKind, StoreError};

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Per-record and configuration errors raised during a sync run.
///
/// All variants except `UnsupportedResourceKind` are caught at the
/// orchestrator boundary, routed to the error callback and recorded in
/// the statistics; they never escape a `sync` call.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The draft carries no external key and cannot be correlated
    /// with an existing record.
    #[error("Draft with name '{name}' doesn't have an external key")]
    MissingExternalKey { name: String },

    /// A reference key failed validation before any lookup happened.
    #[error("Invalid reference key '{key}': {message}")]
    InvalidReferenceKey { key: String, message: String },

    /// A reference field could not be resolved to a store id.
    #[error("Failed to resolve {field} reference on draft with external key '{external_key}'. Reason: {message}")]
    ReferenceResolution {
        external_key: String,
        field: String,
        message: String,
    },

    /// No custom-field action builder exists for this resource kind.
    /// This is a configuration error and fails the whole run before
    /// any draft is processed.
    #[error("Custom-field update actions for resource kind '{kind}' are not implemented")]
    UnsupportedResourceKind { kind: ResourceKind },

    /// Fetching the existing record(s) failed at the transport level.
    #[error("Failed to fetch record with external key '{external_key}'. Reason: {source}")]
    Fetch {
        external_key: String,
        #[source]
        source: StoreError,
    },

    /// Creating a new record failed at the transport level.
    #[error("Failed to create record with external key '{external_key}'. Reason: {source}")]
    Create {
        external_key: String,
        #[source]
        source: StoreError,
    },

    /// Updating an existing record failed at the transport level.
    #[error("Failed to update record with external key '{external_key}'. Reason: {source}")]
    Update {
        external_key: String,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Create a resolution error naming the failing field and key.
    pub fn resolution(
        external_key: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ReferenceResolution {
            external_key: external_key.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a key-validation error.
    pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReferenceKey {
            key: key.into(),
            message: message.into(),
        }
    }
}

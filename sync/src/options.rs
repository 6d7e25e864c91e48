//! Options controlling one sync invocation

use std::sync::Arc;

use crate::error::SyncError;

/// Called on every handled per-record failure with a formatted message
/// and the causing error.
pub type ErrorCallback = Arc<dyn Fn(&str, Option<&SyncError>) + Send + Sync>;

/// Called on non-fatal events, e.g. an optional reference that matched
/// no record and was left unresolved.
pub type WarningCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Default number of drafts accumulated per existing-record prefetch.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Options for sync operations
#[derive(Clone)]
pub struct SyncOptions {
    /// Number of drafts whose existing counterparts are fetched in one
    /// key-in-set query.
    pub batch_size: usize,
    /// Remove locales present on the existing record but absent from
    /// the draft. When false, localized fields merge additively.
    pub remove_other_locales: bool,
    /// Remove assignment-set entries absent from the draft.
    pub remove_other_set_entries: bool,
    /// Remove ordered-collection entries absent from the draft.
    pub remove_other_collection_entries: bool,
    /// Remove generic properties absent from the draft.
    pub remove_other_properties: bool,
    /// Accept reference keys that look like store-internal UUIDs.
    /// Off by default to catch callers passing ids where external
    /// keys are expected.
    pub allow_uuid_keys: bool,
    /// Error callback invoked for every failed record.
    pub error_callback: Option<ErrorCallback>,
    /// Warning callback for non-fatal events.
    pub warning_callback: Option<WarningCallback>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            remove_other_locales: true,
            remove_other_set_entries: true,
            remove_other_collection_entries: true,
            remove_other_properties: true,
            allow_uuid_keys: false,
            error_callback: None,
            warning_callback: None,
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("batch_size", &self.batch_size)
            .field("remove_other_locales", &self.remove_other_locales)
            .field("remove_other_set_entries", &self.remove_other_set_entries)
            .field(
                "remove_other_collection_entries",
                &self.remove_other_collection_entries,
            )
            .field("remove_other_properties", &self.remove_other_properties)
            .field("allow_uuid_keys", &self.allow_uuid_keys)
            .field("error_callback", &self.error_callback.is_some())
            .field("warning_callback", &self.warning_callback.is_some())
            .finish()
    }
}

impl SyncOptions {
    pub fn builder() -> SyncOptionsBuilder {
        SyncOptionsBuilder::default()
    }

    /// Route a formatted failure message to the error callback, if set.
    pub fn apply_error_callback(&self, message: &str, cause: Option<&SyncError>) {
        tracing::warn!(error = ?cause, "{}", message);
        if let Some(callback) = &self.error_callback {
            callback(message, cause);
        }
    }

    /// Route a warning message to the warning callback, if set.
    pub fn apply_warning_callback(&self, message: &str) {
        tracing::debug!("{}", message);
        if let Some(callback) = &self.warning_callback {
            callback(message);
        }
    }
}

/// Builder for `SyncOptions`
#[derive(Default)]
pub struct SyncOptionsBuilder {
    options: SyncOptions,
}

impl SyncOptionsBuilder {
    /// Set the prefetch batch size. Zero is ignored and the default
    /// of 30 is kept.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.options.batch_size = batch_size;
        }
        self
    }

    pub fn remove_other_locales(mut self, remove: bool) -> Self {
        self.options.remove_other_locales = remove;
        self
    }

    pub fn remove_other_set_entries(mut self, remove: bool) -> Self {
        self.options.remove_other_set_entries = remove;
        self
    }

    pub fn remove_other_collection_entries(mut self, remove: bool) -> Self {
        self.options.remove_other_collection_entries = remove;
        self
    }

    pub fn remove_other_properties(mut self, remove: bool) -> Self {
        self.options.remove_other_properties = remove;
        self
    }

    pub fn allow_uuid_keys(mut self, allow: bool) -> Self {
        self.options.allow_uuid_keys = allow;
        self
    }

    pub fn error_callback(
        mut self,
        callback: impl Fn(&str, Option<&SyncError>) + Send + Sync + 'static,
    ) -> Self {
        self.options.error_callback = Some(Arc::new(callback));
        self
    }

    pub fn warning_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.options.warning_callback = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> SyncOptions {
        self.options
    }
}

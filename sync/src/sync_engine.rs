//! Orchestrator driving the per-draft reconciliation pipeline

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use keysync_store::{Draft, ExistingRecord, RecordStore, ResourceKind};
use tracing::{debug, info};

use crate::cache::ReferenceCache;
use crate::custom::CustomFieldActionBuilder;
use crate::diff;
use crate::error::{Result, SyncError};
use crate::fetcher;
use crate::options::SyncOptions;
use crate::resolver::ReferenceResolver;
use crate::stats::{SyncStatistics, SyncStatisticsBuilder};

/// Reconciles batches of drafts against one record store.
///
/// Each draft runs its full pipeline to completion before the next
/// one starts: resolve references, match the existing record by
/// external key, diff or create, apply. One record's failure is
/// isolated; it is reported through the error callback, counted, and
/// never aborts the batch.
pub struct RecordSync<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    options: SyncOptions,
}

impl<'a, S: RecordStore + ?Sized> RecordSync<'a, S> {
    pub fn new(store: &'a S, options: SyncOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronize the drafts and return the run's statistics.
    ///
    /// The only error that escapes is `UnsupportedResourceKind`: a
    /// build-time misconfiguration detected before any draft is
    /// processed. Everything else is converted into a formatted
    /// message, routed to the error callback and counted as a failed
    /// record.
    pub async fn sync(&self, drafts: &[Draft]) -> Result<SyncStatistics> {
        // Registration errors fail the whole run up front, before any
        // network interaction.
        let kinds: BTreeSet<ResourceKind> = drafts.iter().map(|draft| draft.kind).collect();
        for kind in kinds {
            CustomFieldActionBuilder::for_kind(kind)?;
        }

        let mut stats = SyncStatisticsBuilder::new();
        let warnings: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let options = self.intercept_warnings(&warnings);

        let cache = ReferenceCache::new();
        let resolver = ReferenceResolver::new(self.store, &options, &cache);

        info!(drafts = drafts.len(), batch_size = options.batch_size, "Starting sync");

        for chunk in drafts.chunks(options.batch_size) {
            let prefetched = self.prefetch_existing(chunk, &cache).await;

            for draft in chunk {
                stats.increment_processed();
                self.process_draft(draft, &resolver, &prefetched, &options, &mut stats)
                    .await;
            }
        }

        for warning in warnings.lock().unwrap().drain(..) {
            stats.record_warning(warning);
        }

        let snapshot = stats.build();
        info!("{}", snapshot.summary());
        Ok(snapshot)
    }

    /// Wrap the warning callback so warnings also land in the run's
    /// statistics.
    fn intercept_warnings(&self, sink: &Arc<Mutex<Vec<String>>>) -> SyncOptions {
        let mut options = self.options.clone();
        let user_callback = options.warning_callback.clone();
        let sink = Arc::clone(sink);
        options.warning_callback = Some(Arc::new(move |message: &str| {
            sink.lock().unwrap().push(message.to_string());
            if let Some(callback) = &user_callback {
                callback(message);
            }
        }));
        options
    }

    /// Fetch the existing counterparts of a whole chunk with one
    /// key-in-set query per kind, priming the reference cache with
    /// every record found.
    ///
    /// A transport failure here marks the affected kind as failed; the
    /// per-draft loop turns that into per-record fetch failures.
    async fn prefetch_existing(
        &self,
        chunk: &[Draft],
        cache: &ReferenceCache,
    ) -> PrefetchResult {
        let mut found: HashMap<(ResourceKind, String), ExistingRecord> = HashMap::new();
        let mut failed_kinds: HashMap<ResourceKind, String> = HashMap::new();

        let kinds: BTreeSet<ResourceKind> = chunk.iter().map(|draft| draft.kind).collect();
        for kind in kinds {
            let keys: Vec<String> = chunk
                .iter()
                .filter(|draft| draft.kind == kind)
                .map(|draft| draft.external_key.trim())
                .filter(|key| !key.is_empty())
                .map(String::from)
                .collect();
            if keys.is_empty() {
                continue;
            }

            match fetcher::fetch_matching_by_keys(self.store, kind, keys).await {
                Ok(records) => {
                    for record in records {
                        cache.prime(kind, record.external_key.clone(), record.id.clone());
                        found.insert((kind, record.external_key.clone()), record);
                    }
                }
                Err(error) => {
                    failed_kinds.insert(kind, error.to_string());
                }
            }
        }

        PrefetchResult {
            found,
            failed_kinds,
        }
    }

    async fn process_draft(
        &self,
        draft: &Draft,
        resolver: &ReferenceResolver<'_, S>,
        prefetched: &PrefetchResult,
        options: &SyncOptions,
        stats: &mut SyncStatisticsBuilder,
    ) {
        let external_key = draft.external_key.trim();
        if external_key.is_empty() {
            let name = draft
                .name
                .values()
                .next()
                .cloned()
                .unwrap_or_default();
            let error = SyncError::MissingExternalKey { name };
            self.handle_error(&error.to_string(), Some(&error), options, stats);
            return;
        }

        if let Some(reason) = prefetched.failed_kinds.get(&draft.kind) {
            self.handle_error(
                &format!(
                    "Failed to fetch record with external key '{external_key}'. Reason: {reason}"
                ),
                None,
                options,
                stats,
            );
            return;
        }

        let mut resolved = match resolver.resolve(draft).await {
            Ok(resolved) => resolved,
            Err(error) => {
                self.handle_error(&error.to_string(), Some(&error), options, stats);
                return;
            }
        };
        // The trimmed key identifies the record everywhere: prefetch,
        // match and create.
        resolved.external_key = external_key.to_string();

        match prefetched.found.get(&(draft.kind, external_key.to_string())) {
            None => self.create_record(&resolved, options, stats).await,
            Some(existing) => {
                self.update_record(existing, &resolved, options, stats)
                    .await
            }
        }
    }

    async fn create_record(
        &self,
        draft: &Draft,
        options: &SyncOptions,
        stats: &mut SyncStatisticsBuilder,
    ) {
        debug!(external_key = %draft.external_key, kind = %draft.kind, "Creating record");
        match self.store.create_record(draft).await {
            Ok(_) => stats.increment_created(),
            Err(source) => {
                let error = SyncError::Create {
                    external_key: draft.external_key.clone(),
                    source,
                };
                self.handle_error(&error.to_string(), Some(&error), options, stats);
            }
        }
    }

    async fn update_record(
        &self,
        existing: &ExistingRecord,
        desired: &Draft,
        options: &SyncOptions,
        stats: &mut SyncStatisticsBuilder,
    ) {
        let actions = match diff::build_actions(existing, desired, options) {
            Ok(actions) => actions,
            Err(error) => {
                self.handle_error(&error.to_string(), Some(&error), options, stats);
                return;
            }
        };

        if actions.is_empty() {
            stats.increment_up_to_date();
            return;
        }

        debug!(
            external_key = %desired.external_key,
            actions = actions.len(),
            "Updating record"
        );
        match self
            .store
            .update_record(existing.kind, &existing.id, &actions)
            .await
        {
            Ok(_) => stats.increment_updated(),
            Err(source) => {
                let error = SyncError::Update {
                    external_key: desired.external_key.clone(),
                    source,
                };
                self.handle_error(&error.to_string(), Some(&error), options, stats);
            }
        }
    }

    fn handle_error(
        &self,
        message: &str,
        cause: Option<&SyncError>,
        options: &SyncOptions,
        stats: &mut SyncStatisticsBuilder,
    ) {
        options.apply_error_callback(message, cause);
        stats.record_error(message);
        stats.increment_failed();
    }
}

struct PrefetchResult {
    found: HashMap<(ResourceKind, String), ExistingRecord>,
    failed_kinds: HashMap<ResourceKind, String>,
}

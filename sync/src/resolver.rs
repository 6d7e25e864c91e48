//! Reference resolution for drafts
//!
//! Turns symbolic external keys embedded in a draft into concrete
//! store ids before the draft is diffed or created. Identity
//! references (parent, custom type) are required: a failure there is
//! fatal for the record. Reference collections degrade per entry and
//! never fail the whole draft.

use std::collections::HashSet;

use keysync_store::{Draft, RecordStore, Reference, ResourceKind};
use uuid::Uuid;

use crate::cache::ReferenceCache;
use crate::error::{Result, SyncError};
use crate::fetcher;
use crate::options::SyncOptions;

/// Extract the lookup key from an unresolved reference.
///
/// Fails when the key is blank, or when it is UUID-shaped and the
/// `allow_uuid_keys` option is off. The latter guards against callers
/// accidentally passing store-internal ids where stable external keys
/// are expected.
pub fn extract_key(reference: &Reference, allow_uuid_keys: bool) -> Result<String> {
    let key = reference.key().unwrap_or_default();
    if key.trim().is_empty() {
        return Err(SyncError::invalid_key(key, "key value is blank"));
    }
    if !allow_uuid_keys && Uuid::parse_str(key).is_ok() {
        return Err(SyncError::invalid_key(
            key,
            "key is in UUID format; set allow_uuid_keys to accept UUID keys",
        ));
    }
    Ok(key.to_string())
}

/// Resolves the reference fields of drafts against one store, caching
/// every successful key-to-id lookup for the lifetime of one sync
/// invocation.
pub struct ReferenceResolver<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    options: &'a SyncOptions,
    cache: &'a ReferenceCache,
}

impl<'a, S: RecordStore + ?Sized> ReferenceResolver<'a, S> {
    pub fn new(store: &'a S, options: &'a SyncOptions, cache: &'a ReferenceCache) -> Self {
        Self {
            store,
            options,
            cache,
        }
    }

    /// Resolve every reference field of the draft, returning a new
    /// draft with concrete ids where resolution succeeded.
    ///
    /// The parent and custom-type references are independent and are
    /// resolved concurrently; the reference collections follow
    /// sequentially since they share the batch-fetch path.
    pub async fn resolve(&self, draft: &Draft) -> Result<Draft> {
        let mut resolved = draft.clone();

        let (parent, custom) = tokio::try_join!(
            self.resolve_identity_reference(draft, draft.parent.as_ref(), "parent"),
            self.resolve_custom_type(draft),
        )?;
        resolved.parent = parent;
        resolved.custom = custom;

        resolved.assignments = self
            .resolve_reference_list(draft, &draft.assignments, "assignments")
            .await?;
        resolved.entries = self
            .resolve_reference_list(draft, &draft.entries, "entries")
            .await?;

        Ok(resolved)
    }

    /// Resolve a required single reference. Invalid keys, transport
    /// failures and missing targets are all fatal: a record cannot be
    /// created without its parent or type.
    async fn resolve_identity_reference(
        &self,
        draft: &Draft,
        reference: Option<&Reference>,
        field: &str,
    ) -> Result<Option<Reference>> {
        let reference = match reference {
            Some(reference) => reference,
            None => return Ok(None),
        };
        if reference.is_resolved() {
            return Ok(Some(reference.clone()));
        }

        let key = extract_key(reference, self.options.allow_uuid_keys)
            .map_err(|e| SyncError::resolution(&draft.external_key, field, e.to_string()))?;

        let id = self
            .cache
            .resolve(self.store, reference.kind(), &key)
            .await
            .map_err(|e| SyncError::resolution(&draft.external_key, field, e.to_string()))?;

        match id {
            Some(id) => Ok(Some(Reference::by_id(reference.kind(), id))),
            None => Err(SyncError::resolution(
                &draft.external_key,
                field,
                format!("record with key '{key}' was not found"),
            )),
        }
    }

    async fn resolve_custom_type(
        &self,
        draft: &Draft,
    ) -> Result<Option<keysync_store::CustomFieldsDraft>> {
        let custom = match &draft.custom {
            Some(custom) => custom,
            None => return Ok(None),
        };

        match self
            .resolve_identity_reference(draft, Some(&custom.type_ref), "custom type")
            .await?
        {
            Some(type_ref) => Ok(Some(keysync_store::CustomFieldsDraft {
                type_ref,
                fields: custom.fields.clone(),
            })),
            None => Ok(None),
        }
    }

    /// Resolve a reference collection with one batched key-in-set
    /// fetch per referenced kind.
    ///
    /// Entries with invalid keys are reported through the error
    /// callback and passed through unchanged; entries whose key
    /// matches no record are reported through the warning callback and
    /// also passed through unchanged. Only a transport failure fails
    /// the field as a whole.
    async fn resolve_reference_list(
        &self,
        draft: &Draft,
        references: &[Reference],
        field: &str,
    ) -> Result<Vec<Reference>> {
        // Keys that passed validation and still need an id.
        let mut pending: Vec<(ResourceKind, String)> = Vec::new();
        for reference in references.iter().filter(|r| !r.is_resolved()) {
            match extract_key(reference, self.options.allow_uuid_keys) {
                Ok(key) => {
                    if self.cache.get(reference.kind(), &key).is_none() {
                        pending.push((reference.kind(), key));
                    }
                }
                Err(error) => {
                    self.options.apply_error_callback(
                        &format!(
                            "Failed to resolve {field} reference on draft with external key '{}'. Reason: {error}",
                            draft.external_key
                        ),
                        Some(&error),
                    );
                }
            }
        }

        let kinds: HashSet<ResourceKind> = pending.iter().map(|(kind, _)| *kind).collect();
        for kind in kinds {
            let keys: Vec<String> = pending
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, key)| key.clone())
                .collect();
            let records = fetcher::fetch_matching_by_keys(self.store, kind, keys)
                .await
                .map_err(|e| SyncError::resolution(&draft.external_key, field, e.to_string()))?;
            for record in records {
                self.cache.prime(kind, record.external_key, record.id);
            }
        }

        let resolved = references
            .iter()
            .map(|reference| {
                if reference.is_resolved() {
                    return reference.clone();
                }
                let key = match extract_key(reference, self.options.allow_uuid_keys) {
                    Ok(key) => key,
                    // Already reported above; field stays unchanged.
                    Err(_) => return reference.clone(),
                };
                match self.cache.get(reference.kind(), &key) {
                    Some(id) => Reference::by_id(reference.kind(), id),
                    None => {
                        self.options.apply_warning_callback(&format!(
                            "Could not resolve {field} reference with key '{key}' on draft with \
                             external key '{}': no matching record, leaving it unresolved",
                            draft.external_key
                        ));
                        reference.clone()
                    }
                }
            })
            .collect();

        Ok(resolved)
    }
}

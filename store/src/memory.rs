//! In-memory record store
//!
//! Backs the engine's tests and is useful for embedders that want to
//! dry-run a sync against a snapshot. Applies update actions with the
//! same field semantics the remote store is expected to have, so a
//! second sync run against the mutated state observes convergence.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, StoreError};
use crate::store::RecordStore;
use crate::types::{
    CustomFields, Draft, ExistingRecord, QueryPredicate, ResourceKind, UpdateAction,
};

/// Counters for the store primitives, readable by tests.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub lookups: AtomicUsize,
    pub queries: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

#[derive(Debug, Default)]
struct FailureInjection {
    creates: AtomicBool,
    updates: AtomicBool,
    queries: AtomicBool,
}

/// Record store holding everything in process memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<ExistingRecord>>,
    next_id: AtomicU64,
    pub calls: CallCounts,
    fail: FailureInjection,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing record.
    pub fn insert(&self, record: ExistingRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// Make subsequent creates fail with a server error.
    pub fn fail_creates(&self, enabled: bool) {
        self.fail.creates.store(enabled, Ordering::SeqCst);
    }

    /// Make subsequent updates fail with a server error.
    pub fn fail_updates(&self, enabled: bool) {
        self.fail.updates.store(enabled, Ordering::SeqCst);
    }

    /// Make subsequent page queries fail with a server error.
    pub fn fail_queries(&self, enabled: bool) {
        self.fail.queries.store(enabled, Ordering::SeqCst);
    }

    /// Snapshot of a record by external key, if present.
    pub fn find_by_key(&self, kind: ResourceKind, key: &str) -> Option<ExistingRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.kind == kind && r.external_key == key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn server_error() -> StoreError {
        StoreError::Server {
            status: 500,
            message: "injected failure".to_string(),
        }
    }

    fn apply_action(record: &mut ExistingRecord, action: &UpdateAction) {
        match action {
            UpdateAction::ChangeParent { parent_id } => {
                record.parent_id = Some(parent_id.clone());
            }
            UpdateAction::SetLocalizedValue {
                field,
                locale,
                value,
            } => {
                let target = match field.as_str() {
                    "name" => &mut record.name,
                    "description" => record.description.get_or_insert_with(BTreeMap::new),
                    _ => return,
                };
                target.insert(locale.clone(), value.clone());
            }
            UpdateAction::RemoveLocalizedValue { field, locale } => match field.as_str() {
                "name" => {
                    record.name.remove(locale);
                }
                "description" => {
                    if let Some(description) = record.description.as_mut() {
                        description.remove(locale);
                        if description.is_empty() {
                            record.description = None;
                        }
                    }
                }
                _ => {}
            },
            UpdateAction::SetProperty { name, value } => {
                record.properties.insert(name.clone(), value.clone());
            }
            UpdateAction::RemoveProperty { name } => {
                record.properties.remove(name);
            }
            UpdateAction::AddAssignment { id } => {
                if !record.assignment_ids.contains(id) {
                    record.assignment_ids.push(id.clone());
                }
            }
            UpdateAction::RemoveAssignment { id } => {
                record.assignment_ids.retain(|existing| existing != id);
            }
            UpdateAction::AddEntry { id } => {
                if !record.entry_ids.contains(id) {
                    record.entry_ids.push(id.clone());
                }
            }
            UpdateAction::RemoveEntry { id } => {
                record.entry_ids.retain(|existing| existing != id);
            }
            UpdateAction::ReorderEntries { ids } => {
                record.entry_ids = ids.clone();
            }
            UpdateAction::SetCustomType { type_id, fields } => {
                record.custom = Some(CustomFields {
                    type_id: type_id.clone(),
                    fields: fields.clone(),
                });
            }
            UpdateAction::RemoveCustomType => {
                record.custom = None;
            }
            UpdateAction::SetCustomField { name, value } => {
                if let Some(custom) = record.custom.as_mut() {
                    custom.fields.insert(name.clone(), value.clone());
                }
            }
            UpdateAction::RemoveCustomField { name } => {
                if let Some(custom) = record.custom.as_mut() {
                    custom.fields.remove(name);
                }
            }
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn lookup_id_by_key(&self, kind: ResourceKind, key: &str) -> Result<Option<String>> {
        self.calls.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.find_by_key(kind, key).map(|record| record.id))
    }

    async fn query_page(
        &self,
        kind: ResourceKind,
        predicate: &QueryPredicate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ExistingRecord>> {
        self.calls.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail.queries.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let records = self.records.lock().unwrap();
        let matching: Vec<ExistingRecord> = records
            .iter()
            .filter(|record| record.kind == kind)
            .filter(|record| match predicate {
                QueryPredicate::All => true,
                QueryPredicate::KeyIn(keys) => keys.contains(&record.external_key),
            })
            .cloned()
            .collect();

        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn create_record(&self, draft: &Draft) -> Result<ExistingRecord> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail.creates.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let now = Utc::now();
        let record = ExistingRecord {
            id: format!("gen-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            version: 1,
            external_key: draft.external_key.clone(),
            kind: draft.kind,
            name: draft.name.clone(),
            description: draft.description.clone(),
            parent_id: draft.parent.as_ref().and_then(|r| r.id()).map(String::from),
            assignment_ids: draft
                .assignments
                .iter()
                .filter_map(|r| r.id())
                .map(String::from)
                .collect(),
            entry_ids: draft
                .entries
                .iter()
                .filter_map(|r| r.id())
                .map(String::from)
                .collect(),
            properties: draft.properties.clone(),
            custom: draft.custom.as_ref().and_then(|custom| {
                custom.type_ref.id().map(|type_id| CustomFields {
                    type_id: type_id.to_string(),
                    fields: custom.fields.clone(),
                })
            }),
            created: now,
            updated: now,
        };

        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        kind: ResourceKind,
        id: &str,
        actions: &[UpdateAction],
    ) -> Result<ExistingRecord> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail.updates.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|record| record.kind == kind && record.id == id)
            .ok_or(StoreError::NotFound)?;

        for action in actions {
            Self::apply_action(record, action);
        }
        record.version += 1;
        record.updated = Utc::now();

        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reference;

    fn record(kind: ResourceKind, id: &str, key: &str) -> ExistingRecord {
        let now = Utc::now();
        ExistingRecord {
            id: id.to_string(),
            version: 1,
            external_key: key.to_string(),
            kind,
            name: BTreeMap::from([("en".to_string(), key.to_string())]),
            description: None,
            parent_id: None,
            assignment_ids: Vec::new(),
            entry_ids: Vec::new(),
            properties: BTreeMap::new(),
            custom: None,
            created: now,
            updated: now,
        }
    }

    #[tokio::test]
    async fn lookup_counts_calls_and_finds_ids() {
        let store = InMemoryRecordStore::new();
        store.insert(record(ResourceKind::Category, "id-c0", "c0"));

        let id = store
            .lookup_id_by_key(ResourceKind::Category, "c0")
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("id-c0"));

        let missing = store
            .lookup_id_by_key(ResourceKind::Category, "nope")
            .await
            .unwrap();
        assert_eq!(missing, None);
        assert_eq!(store.calls.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_page_respects_offset_and_limit() {
        let store = InMemoryRecordStore::new();
        for i in 0..5 {
            store.insert(record(
                ResourceKind::Category,
                &format!("id-{i}"),
                &format!("key-{i}"),
            ));
        }

        let page = store
            .query_page(ResourceKind::Category, &QueryPredicate::All, 3, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "id-3");
    }

    #[tokio::test]
    async fn update_applies_actions_in_order() {
        let store = InMemoryRecordStore::new();
        store.insert(record(ResourceKind::Category, "id-c1", "c1"));

        let actions = vec![
            UpdateAction::SetLocalizedValue {
                field: "name".to_string(),
                locale: "en".to_string(),
                value: "Boots".to_string(),
            },
            UpdateAction::ChangeParent {
                parent_id: "id-c0".to_string(),
            },
        ];
        let updated = store
            .update_record(ResourceKind::Category, "id-c1", &actions)
            .await
            .unwrap();

        assert_eq!(updated.name.get("en").unwrap(), "Boots");
        assert_eq!(updated.parent_id.as_deref(), Some("id-c0"));
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn create_materializes_resolved_references() {
        let store = InMemoryRecordStore::new();
        let mut draft = Draft::new(ResourceKind::Category, "c2", "Hats");
        draft.parent = Some(Reference::by_id(ResourceKind::Category, "id-c0"));
        draft.assignments = vec![
            Reference::by_id(ResourceKind::Channel, "id-ch1"),
            Reference::by_key(ResourceKind::Channel, "never-resolved"),
        ];

        let created = store.create_record(&draft).await.unwrap();
        assert_eq!(created.parent_id.as_deref(), Some("id-c0"));
        // Unresolved references are not materialized.
        assert_eq!(created.assignment_ids, vec!["id-ch1".to_string()]);
    }
}

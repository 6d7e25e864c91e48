//! End-to-end tests of the sync orchestrator against the in-memory
//! store

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use keysync_store::{
    Draft, ExistingRecord, InMemoryRecordStore, Reference, ResourceKind,
};
use serde_json::json;

use crate::error::SyncError;
use crate::options::SyncOptions;
use crate::sync_engine::RecordSync;
use crate::sync_records;

fn draft(key: &str, name: &str) -> Draft {
    Draft::new(ResourceKind::Category, key, name)
}

fn record(id: &str, key: &str, name: &str) -> ExistingRecord {
    let now = Utc::now();
    ExistingRecord {
        id: id.to_string(),
        version: 1,
        external_key: key.to_string(),
        kind: ResourceKind::Category,
        name: BTreeMap::from([("en".to_string(), name.to_string())]),
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

#[test_log::test(tokio::test)]
async fn missing_record_is_created() {
    let store = InMemoryRecordStore::new();
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine.sync(&[draft("c1", "Shoes")]).await.unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.failed, 0);
    assert!(store.find_by_key(ResourceKind::Category, "c1").is_some());
}

#[test_log::test(tokio::test)]
async fn matching_record_is_up_to_date() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c1", "c1", "Shoes"));
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine.sync(&[draft("c1", "Shoes")]).await.unwrap();

    assert_eq!(stats.up_to_date, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.updated, 0);
    assert_eq!(store.calls.updates.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn changed_record_is_updated() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c1", "c1", "Shoes"));
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine.sync(&[draft("c1", "Boots")]).await.unwrap();

    assert_eq!(stats.updated, 1);
    let updated = store.find_by_key(ResourceKind::Category, "c1").unwrap();
    assert_eq!(updated.name.get("en").unwrap(), "Boots");
    assert_eq!(updated.version, 2);
}

#[test_log::test(tokio::test)]
async fn padded_external_key_matches_and_creates_trimmed() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c1", "c1", "Shoes"));
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine
        .sync(&[draft("  c1  ", "Shoes"), draft(" c2 ", "Hats")])
        .await
        .unwrap();

    // The padded key still matches its prefetched record instead of
    // re-creating it, and the created record carries the trimmed key.
    assert_eq!(stats.up_to_date, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(store.len(), 2);
    assert!(store.find_by_key(ResourceKind::Category, "c2").is_some());
}

#[test_log::test(tokio::test)]
async fn blank_external_key_fails_the_draft() {
    let store = InMemoryRecordStore::new();
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine.sync(&[draft("  ", "NoKey")]).await.unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.created, 0);
    assert!(stats.error_messages[0].contains("doesn't have an external key"));
    assert!(stats.error_messages[0].contains("NoKey"));
    assert_eq!(store.calls.creates.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn missing_parent_fails_only_that_draft() {
    let store = InMemoryRecordStore::new();
    let engine = RecordSync::new(&store, SyncOptions::default());

    let mut orphan = draft("c1", "Shoes");
    orphan.parent = Some(Reference::by_key(ResourceKind::Category, "missing-parent"));
    let drafts = vec![orphan, draft("c2", "Hats")];

    let stats = engine.sync(&drafts).await.unwrap();

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.created, 1);
    assert!(stats.error_messages[0].contains("missing-parent"));
    assert!(stats.error_messages[0].contains("parent"));
    assert!(store.find_by_key(ResourceKind::Category, "c1").is_none());
    assert!(store.find_by_key(ResourceKind::Category, "c2").is_some());
}

#[test_log::test(tokio::test)]
async fn shared_parent_key_is_looked_up_once() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c0", "c0", "Root"));
    let engine = RecordSync::new(&store, SyncOptions::default());

    let drafts: Vec<Draft> = (1..=3)
        .map(|i| {
            let mut child = draft(&format!("c{i}"), &format!("Child {i}"));
            child.parent = Some(Reference::by_key(ResourceKind::Category, "c0"));
            child
        })
        .collect();

    let stats = engine.sync(&drafts).await.unwrap();

    assert_eq!(stats.created, 3);
    assert_eq!(store.calls.lookups.load(Ordering::SeqCst), 1);
    let child = store.find_by_key(ResourceKind::Category, "c2").unwrap();
    assert_eq!(child.parent_id.as_deref(), Some("id-c0"));
}

#[test_log::test(tokio::test)]
async fn second_run_converges_to_up_to_date() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c1", "c1", "Shoes"));

    let mut changed = draft("c1", "Boots");
    changed.properties.insert("season".to_string(), json!("winter"));
    let drafts = vec![changed, draft("c2", "Hats")];

    let first = sync_records(&store, &drafts, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.updated, 1);
    assert_eq!(first.created, 1);

    let second = sync_records(&store, &drafts, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.up_to_date, 2);
    assert_eq!(second.updated, 0);
    assert_eq!(second.failed, 0);
}

#[test_log::test(tokio::test)]
async fn one_failure_does_not_abort_the_batch() {
    let store = InMemoryRecordStore::new();
    let engine = RecordSync::new(&store, SyncOptions::default());

    let drafts = vec![draft("c1", "Shoes"), draft("", "Broken"), draft("c3", "Hats")];
    let stats = engine.sync(&drafts).await.unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.created, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.error_messages.len(), 1);
}

#[test_log::test(tokio::test)]
async fn unsupported_kind_fails_before_any_store_call() {
    let store = InMemoryRecordStore::new();
    let engine = RecordSync::new(&store, SyncOptions::default());

    let drafts = vec![
        draft("c1", "Shoes"),
        Draft::new(ResourceKind::Product, "p1", "Widget"),
    ];
    let error = engine.sync(&drafts).await.unwrap_err();

    assert!(matches!(
        error,
        SyncError::UnsupportedResourceKind {
            kind: ResourceKind::Product
        }
    ));
    assert_eq!(store.calls.queries.load(Ordering::SeqCst), 0);
    assert_eq!(store.calls.creates.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn prefetch_failure_fails_every_draft_of_the_kind() {
    let store = InMemoryRecordStore::new();
    store.fail_queries(true);
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine
        .sync(&[draft("c1", "Shoes"), draft("c2", "Hats")])
        .await
        .unwrap();

    assert_eq!(stats.failed, 2);
    assert_eq!(stats.created, 0);
    assert!(stats.error_messages[0].contains("Failed to fetch record with external key 'c1'"));
    assert!(stats.error_messages[1].contains("Failed to fetch record with external key 'c2'"));
}

#[test_log::test(tokio::test)]
async fn create_failure_is_reported_per_record() {
    let store = InMemoryRecordStore::new();
    store.fail_creates(true);
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine.sync(&[draft("c1", "Shoes")]).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.created, 0);
    assert!(stats.error_messages[0].contains("Failed to create record with external key 'c1'"));
}

#[test_log::test(tokio::test)]
async fn update_failure_is_reported_per_record() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c1", "c1", "Shoes"));
    store.fail_updates(true);
    let engine = RecordSync::new(&store, SyncOptions::default());

    let stats = engine.sync(&[draft("c1", "Boots")]).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.updated, 0);
    assert!(stats.error_messages[0].contains("Failed to update record with external key 'c1'"));
}

#[test_log::test(tokio::test)]
async fn error_callback_receives_each_failure() {
    let store = InMemoryRecordStore::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = SyncOptions::builder()
        .error_callback(move |message, _cause| {
            sink.lock().unwrap().push(message.to_string());
        })
        .build();
    let engine = RecordSync::new(&store, options);

    engine
        .sync(&[draft("", "Broken"), draft("c2", "Hats")])
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("doesn't have an external key"));
}

#[test_log::test(tokio::test)]
async fn unresolved_optional_reference_warns_and_creates_anyway() {
    let store = InMemoryRecordStore::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = SyncOptions::builder()
        .warning_callback(move |message| {
            sink.lock().unwrap().push(message.to_string());
        })
        .build();
    let engine = RecordSync::new(&store, options);

    let mut tagged = draft("c1", "Shoes");
    tagged.assignments = vec![Reference::by_key(ResourceKind::Channel, "ghost")];

    let stats = engine.sync(&[tagged]).await.unwrap();

    assert_eq!(stats.created, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.warning_messages.len(), 1);
    assert!(stats.warning_messages[0].contains("ghost"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);

    // The unresolved assignment is not materialized on the record.
    let created = store.find_by_key(ResourceKind::Category, "c1").unwrap();
    assert!(created.assignment_ids.is_empty());
}

#[test_log::test(tokio::test)]
async fn uuid_parent_key_is_rejected_by_default() {
    let store = InMemoryRecordStore::new();
    let engine = RecordSync::new(&store, SyncOptions::default());

    let mut child = draft("c1", "Shoes");
    child.parent = Some(Reference::by_key(
        ResourceKind::Category,
        "67c34b76-0a3d-4e9c-8c6d-6a43e8df2a11",
    ));

    let stats = engine.sync(&[child]).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert!(stats.error_messages[0].contains("UUID"));
}

#[test_log::test(tokio::test)]
async fn custom_type_is_resolved_before_create() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-t1", "pricing", "Pricing Type"));
    let engine = RecordSync::new(&store, SyncOptions::default());

    let mut typed = draft("c1", "Shoes");
    typed.custom = Some(keysync_store::CustomFieldsDraft {
        type_ref: Reference::by_key(ResourceKind::Category, "pricing"),
        fields: BTreeMap::from([("tier".to_string(), json!("gold"))]),
    });

    let stats = engine.sync(&[typed]).await.unwrap();

    assert_eq!(stats.created, 1);
    let created = store.find_by_key(ResourceKind::Category, "c1").unwrap();
    let custom = created.custom.unwrap();
    assert_eq!(custom.type_id, "id-t1");
    assert_eq!(custom.fields.get("tier").unwrap(), &json!("gold"));
}

#[test_log::test(tokio::test)]
async fn small_batch_size_prefetches_per_chunk() {
    let store = InMemoryRecordStore::new();
    store.insert(record("id-c1", "c1", "Shoes"));
    store.insert(record("id-c3", "c3", "Hats"));
    let options = SyncOptions::builder().batch_size(2).build();
    let engine = RecordSync::new(&store, options);

    let drafts = vec![
        draft("c1", "Shoes"),
        draft("c2", "Socks"),
        draft("c3", "Hats"),
        draft("c4", "Caps"),
    ];
    let stats = engine.sync(&drafts).await.unwrap();

    assert_eq!(stats.up_to_date, 2);
    assert_eq!(stats.created, 2);
    // Two chunks, one key-in-set query each.
    assert_eq!(store.calls.queries.load(Ordering::SeqCst), 2);
}

//! Offset-paginated retrieval of all records matching a predicate

use keysync_store::{
    ExistingRecord, QueryPredicate, RecordStore, ResourceKind, Result as StoreResult,
};
use tracing::debug;

/// Page size used when callers don't specify one.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Stream every record matching the predicate through `on_page`.
///
/// Issues offset-based queries (`offset += page_size` per round) until
/// a page shorter than `page_size` comes back. A transport failure on
/// any page aborts the whole fetch and propagates; retry is the store
/// implementation's concern, never this function's.
pub async fn query_all<S, F>(
    store: &S,
    kind: ResourceKind,
    predicate: &QueryPredicate,
    page_size: usize,
    mut on_page: F,
) -> StoreResult<()>
where
    S: RecordStore + ?Sized,
    F: FnMut(&[ExistingRecord]),
{
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    let mut offset = 0;

    loop {
        let page = store.query_page(kind, predicate, offset, page_size).await?;
        debug!(kind = %kind, offset, page_len = page.len(), "Fetched page");

        if page.is_empty() {
            return Ok(());
        }

        on_page(&page);

        if page.len() < page_size {
            return Ok(());
        }
        offset += page_size;
    }
}

/// Fetch every record whose external key is in `keys`, in one
/// paginated key-in-set query.
///
/// Used for batched reference resolution and for prefetching the
/// existing counterparts of a whole draft batch.
pub async fn fetch_matching_by_keys<S>(
    store: &S,
    kind: ResourceKind,
    keys: Vec<String>,
) -> StoreResult<Vec<ExistingRecord>>
where
    S: RecordStore + ?Sized,
{
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let predicate = QueryPredicate::KeyIn(keys);
    let mut records = Vec::new();
    query_all(store, kind, &predicate, DEFAULT_PAGE_SIZE, |page| {
        records.extend_from_slice(page);
    })
    .await?;
    Ok(records)
}

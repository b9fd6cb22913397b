use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use harvest_core::{HarvestItem, HarvestState, ItemId, UpdateOperation, FIELD_HARVEST_STATE};
use serde_json::{Map, Value};

use crate::traits::{ItemStore, RowPosition};
use crate::{ItemQuery, StoreError};

/// In-memory store for tests. Not durable, but keeps every update it received
/// so tests can check the checkpoint sequence.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: Vec<(ItemId, Map<String, Value>)>,
    history: Vec<(ItemId, UpdateOperation)>,
    failure: Option<UpdateFailure>,
    page_fetches: usize,
}

#[derive(Clone, Copy)]
enum UpdateFailure {
    All,
    SettingState(HarvestState),
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_items(items: impl IntoIterator<Item = HarvestItem>) -> anyhow::Result<Self> {
        let store = Self::new();
        for item in items {
            store.insert_item(item)?;
        }
        Ok(store)
    }

    /// Makes every following update fail.
    pub fn fail_all_updates(&self) {
        self.lock().failure = Some(UpdateFailure::All);
    }

    /// Makes updates that write `harvestState = state` fail.
    pub fn fail_updates_setting_state(&self, state: HarvestState) {
        self.lock().failure = Some(UpdateFailure::SettingState(state));
    }

    pub fn clear_failures(&self) {
        self.lock().failure = None;
    }

    /// Updates successfully applied to `id`, oldest first.
    pub fn updates_for(&self, id: &ItemId) -> Vec<UpdateOperation> {
        let inner = self.lock();
        inner.history.iter().filter(|(i, _)| i == id).map(|(_, u)| u.clone()).collect()
    }

    /// Number of pages served so far.
    pub fn page_fetches(&self) -> usize {
        self.lock().page_fetches
    }

    pub fn raw_document(&self, id: &ItemId) -> Option<Map<String, Value>> {
        let inner = self.lock();
        inner.docs.iter().find(|(i, _)| i == id).map(|(_, d)| d.clone())
    }
}

fn to_item(doc: &Map<String, Value>) -> anyhow::Result<HarvestItem> {
    serde_json::from_value(Value::Object(doc.clone())).context("decode stored item")
}

fn rejects(failure: Option<UpdateFailure>, update: &UpdateOperation) -> bool {
    match failure {
        None => false,
        Some(UpdateFailure::All) => true,
        Some(UpdateFailure::SettingState(state)) => {
            update.get(FIELD_HARVEST_STATE).and_then(Value::as_str) == Some(state.as_str())
        }
    }
}

impl ItemStore for InMemoryStore {
    fn query_page(
        &self,
        query: &ItemQuery,
        after: Option<RowPosition>,
        page_size: usize,
    ) -> anyhow::Result<Vec<(RowPosition, HarvestItem)>> {
        let mut inner = self.lock();
        let start = after.map_or(0, |p| p as usize);
        let page = inner
            .docs
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(_, (_, d))| query.matches(d))
            .take(page_size)
            .map(|(idx, (_, d))| Ok((idx as RowPosition + 1, to_item(d)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        inner.page_fetches += 1;
        Ok(page)
    }

    fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<HarvestItem>> {
        let inner = self.lock();
        inner.docs.iter().find(|(i, _)| i == id).map(|(_, d)| to_item(d)).transpose()
    }

    fn insert_item(&self, mut item: HarvestItem) -> anyhow::Result<ItemId> {
        let id = item.id.clone().unwrap_or_else(ItemId::new);
        item.id = Some(id.clone());
        let mut inner = self.lock();
        if inner.docs.iter().any(|(i, _)| *i == id) {
            return Err(StoreError::DuplicateItem { id }.into());
        }
        let doc = match serde_json::to_value(&item).context("encode item")? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        inner.docs.push((id.clone(), doc));
        Ok(id)
    }

    fn update_item(&self, id: &ItemId, update: &UpdateOperation) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if rejects(inner.failure, update) {
            return Err(StoreError::UpdateRejected { id: id.clone(), reason: "injected failure".into() }.into());
        }
        let doc = inner
            .docs
            .iter_mut()
            .find(|(i, _)| i == id)
            .map(|(_, d)| d)
            .ok_or_else(|| StoreError::UnknownItem(id.clone()))?;
        update.apply_to(doc);
        inner.history.push((id.clone(), update.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemCursor;
    use harvest_core::{FIELD_HARVESTER_ID, FIELD_SHOW};
    use serde_json::json;

    fn item(id: &str, state: HarvestState) -> HarvestItem {
        HarvestItem {
            id: Some(ItemId::from_str(id)),
            title: Some(format!("title {id}")),
            harvest_state: Some(state),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_creates_empty_store() {
        let store = InMemoryStore::new();
        assert!(store.query_items(&ItemQuery::all()).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_get_item() {
        let store = InMemoryStore::new();
        let id = store.insert_item(item("a", HarvestState::New)).unwrap();
        let got = store.get_item(&id).unwrap().unwrap();
        assert_eq!(got.title.as_deref(), Some("title a"));
        assert!(store.get_item(&ItemId::from_str("missing")).unwrap().is_none());
    }

    #[test]
    fn test_insert_assigns_id() {
        let store = InMemoryStore::new();
        let id = store.insert_item(HarvestItem::default()).unwrap();
        assert_eq!(store.get_item(&id).unwrap().unwrap().id, Some(id));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = InMemoryStore::new();
        store.insert_item(item("a", HarvestState::New)).unwrap();
        assert!(store.insert_item(item("a", HarvestState::New)).is_err());
    }

    #[test]
    fn test_query_filters_and_limits_in_order() {
        let store = InMemoryStore::with_items([
            item("a", HarvestState::New),
            item("b", HarvestState::Done),
            item("c", HarvestState::New),
            item("d", HarvestState::New),
        ])
        .unwrap();
        let q = ItemQuery::parse_where(r#"{"harvestState": "New"}"#).unwrap().with_limit(2);
        let ids: Vec<_> = store.query_items(&q).unwrap().into_iter().map(|i| i.id.unwrap().0).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_cursor_pages_lazily_and_sees_later_writes() {
        let store = InMemoryStore::with_items((0..5).map(|i| item(&format!("i{i}"), HarvestState::New))).unwrap();
        let q = ItemQuery::parse_where(r#"{"harvestState": "New"}"#).unwrap();
        let mut cursor = ItemCursor::new(&store, q).with_page_size(2);

        assert_eq!(cursor.next().unwrap().unwrap().id.unwrap().0, "i0");
        assert_eq!(store.page_fetches(), 1);

        // written after the scan started; the next page no longer matches it
        let mut done = UpdateOperation::new();
        done.set(FIELD_HARVEST_STATE, "Done");
        store.update_item(&ItemId::from_str("i2"), &done).unwrap();

        let rest: Vec<_> = cursor.map(|i| i.unwrap().id.unwrap().0).collect();
        assert_eq!(rest, vec!["i1", "i3", "i4"]);
    }

    #[test]
    fn test_cursor_stops_at_query_limit() {
        let store = InMemoryStore::with_items((0..100).map(|i| item(&format!("i{i}"), HarvestState::New))).unwrap();
        let ids: Vec<_> = ItemCursor::new(&store, ItemQuery::all().with_limit(1)).map(|i| i.unwrap().id.unwrap().0).collect();
        assert_eq!(ids, vec!["i0"]);
        assert_eq!(store.page_fetches(), 1);
    }

    #[test]
    fn test_update_merges_fields() {
        let store = InMemoryStore::new();
        let mut it = item("a", HarvestState::New);
        it.show.set_harvester(harvest_core::Channel::Pdf, false);
        let id = store.insert_item(it).unwrap();

        let mut op = UpdateOperation::new();
        op.set(FIELD_HARVEST_STATE, "InProgress").set(FIELD_HARVESTER_ID, "w1");
        store.update_item(&id, &op).unwrap();

        let doc = store.raw_document(&id).unwrap();
        assert_eq!(doc["harvestState"], json!("InProgress"));
        assert_eq!(doc["harvesterId"], json!("w1"));
        assert_eq!(doc["title"], json!("title a"));
        assert_eq!(doc[FIELD_SHOW], json!({"pdf": {"harvester": false}}));
        assert_eq!(store.updates_for(&id), vec![op]);
    }

    #[test]
    fn test_update_unknown_item_fails() {
        let store = InMemoryStore::new();
        let err = store.update_item(&ItemId::from_str("nope"), &UpdateOperation::new()).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::UnknownItem(_))));
    }

    #[test]
    fn test_injected_failure_only_hits_matching_state() {
        let store = InMemoryStore::with_items([item("a", HarvestState::New)]).unwrap();
        let id = ItemId::from_str("a");
        store.fail_updates_setting_state(HarvestState::Failed);

        let mut in_progress = UpdateOperation::new();
        in_progress.set(FIELD_HARVEST_STATE, "InProgress");
        store.update_item(&id, &in_progress).unwrap();

        let mut failed = UpdateOperation::new();
        failed.set(FIELD_HARVEST_STATE, "Failed");
        assert!(store.update_item(&id, &failed).is_err());
        assert_eq!(store.updates_for(&id).len(), 1);

        store.clear_failures();
        store.update_item(&id, &failed).unwrap();
    }
}

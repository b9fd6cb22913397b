use std::collections::VecDeque;

use harvest_core::{HarvestItem, ItemId, UpdateOperation};

use crate::ItemQuery;

/// Position of a row in backend order. Rows never move, so a position can be
/// used to resume a scan after the store has been written to.
pub type RowPosition = u64;

/// Items fetched per backend round trip by [`ItemCursor`].
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// The shared backend holding item rows.
pub trait ItemStore: Send + Sync {
    /// Up to `page_size` items matching `query` that sit after `after` in
    /// backend order, each with its position. The query limit is not applied.
    fn query_page(
        &self,
        query: &ItemQuery,
        after: Option<RowPosition>,
        page_size: usize,
    ) -> anyhow::Result<Vec<(RowPosition, HarvestItem)>>;

    /// Items matching `query`, in backend order, truncated to the query limit.
    fn query_items(&self, query: &ItemQuery) -> anyhow::Result<Vec<HarvestItem>> {
        ItemCursor::new(self, query.clone()).collect()
    }

    fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<HarvestItem>>;

    /// Adds a row. An item without an object id is given a fresh one.
    fn insert_item(&self, item: HarvestItem) -> anyhow::Result<ItemId>;

    /// Field-level merge: writes only the fields listed in `update`.
    fn update_item(&self, id: &ItemId, update: &UpdateOperation) -> anyhow::Result<()>;
}

/// Lazy scan over the items matching a query.
///
/// Pages are fetched only when the previous one is used up, and never past the
/// query limit, so a caller that stops early never reads the rest of the table.
/// Each page reflects the store as it is when fetched.
pub struct ItemCursor<'a, S: ?Sized> {
    store: &'a S,
    query: ItemQuery,
    page_size: usize,
    remaining: usize,
    after: Option<RowPosition>,
    page: VecDeque<(RowPosition, HarvestItem)>,
    exhausted: bool,
}

impl<'a, S: ItemStore + ?Sized> ItemCursor<'a, S> {
    pub fn new(store: &'a S, query: ItemQuery) -> Self {
        let remaining = query.limit().unwrap_or(usize::MAX);
        Self {
            store,
            query,
            page_size: DEFAULT_PAGE_SIZE,
            remaining,
            after: None,
            page: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl<S: ItemStore + ?Sized> Iterator for ItemCursor<'_, S> {
    type Item = anyhow::Result<HarvestItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.page.is_empty() && !self.exhausted {
            let want = self.page_size.min(self.remaining);
            match self.store.query_page(&self.query, self.after, want) {
                Ok(page) => {
                    self.exhausted = page.len() < want;
                    self.page = page.into();
                }
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            }
        }
        let (position, item) = self.page.pop_front()?;
        self.after = Some(position);
        self.remaining -= 1;
        Some(Ok(item))
    }
}

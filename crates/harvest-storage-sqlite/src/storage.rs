use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use harvest_core::{now_ms, HarvestItem, ItemId, UpdateOperation};
use harvest_storage::{ItemQuery, ItemStore, RowPosition, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

/// Local item backend kept in a single sqlite file.
///
/// Each row holds the item as a JSON document. Updates are merged in a
/// transaction and every applied update is appended to `item_updates`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of updates applied to `id` so far.
    pub fn update_count(&self, id: &ItemId) -> Result<usize> {
        let conn = self.conn();
        let n: i64 = conn.query_row("SELECT COUNT(1) FROM item_updates WHERE item_id=?1", params![id.0], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn decode_doc(json: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(json).context("decode stored item")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("stored item is not an object: {other}"),
    }
}

fn to_item(doc: Map<String, Value>) -> Result<HarvestItem> {
    serde_json::from_value(Value::Object(doc)).context("decode stored item")
}

impl ItemStore for SqliteStore {
    fn query_page(
        &self,
        query: &ItemQuery,
        after: Option<RowPosition>,
        page_size: usize,
    ) -> Result<Vec<(RowPosition, HarvestItem)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT seq, doc_json FROM items WHERE seq > ?1 ORDER BY seq")?;
        let after = after.map_or(0, |p| p as i64);
        let mut rows = stmt.query(params![after])?;

        let mut page = vec![];
        while page.len() < page_size {
            let Some(row) = rows.next()? else {
                break;
            };
            let seq: i64 = row.get(0)?;
            let doc = decode_doc(&row.get::<_, String>(1)?)?;
            if query.matches(&doc) {
                page.push((seq as RowPosition, to_item(doc)?));
            }
        }
        Ok(page)
    }

    fn get_item(&self, id: &ItemId) -> Result<Option<HarvestItem>> {
        let conn = self.conn();
        let json: Option<String> = conn
            .query_row("SELECT doc_json FROM items WHERE id=?1", params![id.0], |r| r.get(0))
            .optional()?;
        json.map(|j| decode_doc(&j).and_then(to_item)).transpose()
    }

    fn insert_item(&self, mut item: HarvestItem) -> Result<ItemId> {
        let id = item.id.clone().unwrap_or_else(ItemId::new);
        item.id = Some(id.clone());
        let doc_json = serde_json::to_string(&item).context("encode item")?;
        let now = now_ms();

        let conn = self.conn();
        let exists: i64 = conn.query_row("SELECT COUNT(1) FROM items WHERE id=?1", params![id.0], |r| r.get(0))?;
        if exists > 0 {
            return Err(StoreError::DuplicateItem { id }.into());
        }
        conn.execute(
            "INSERT INTO items(id, doc_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id.0, doc_json, now],
        )?;
        debug!(item = %id, "inserted item");
        Ok(id)
    }

    fn update_item(&self, id: &ItemId, update: &UpdateOperation) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        let json: Option<String> = tx
            .query_row("SELECT doc_json FROM items WHERE id=?1", params![id.0], |r| r.get(0))
            .optional()?;
        let Some(json) = json else {
            return Err(StoreError::UnknownItem(id.clone()).into());
        };

        let mut doc = decode_doc(&json)?;
        update.apply_to(&mut doc);
        let mut patch = Map::new();
        update.apply_to(&mut patch);

        let now = now_ms();
        tx.execute(
            "UPDATE items SET doc_json=?1, updated_at=?2 WHERE id=?3",
            params![Value::Object(doc).to_string(), now, id.0],
        )?;
        tx.execute(
            "INSERT INTO item_updates(item_id, fields_json, applied_at) VALUES (?1, ?2, ?3)",
            params![id.0, Value::Object(patch).to_string(), now],
        )?;
        tx.commit()?;
        debug!(item = %id, fields = update.len(), "applied update");
        Ok(())
    }
}

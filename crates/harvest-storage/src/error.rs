use harvest_core::ItemId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no item with id {0}")]
    UnknownItem(ItemId),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("item {id} already exists")]
    DuplicateItem { id: ItemId },

    #[error("update of {id} rejected: {reason}")]
    UpdateRejected { id: ItemId, reason: String },
}

use harvest_core::{
    Channel, HarvestItem, HarvestState, HarvesterVersion, ItemId, OwnerId, TagMap, Uploader, UpdateOperation,
    FIELD_HARVEST_STATE, FIELD_SHOW, FIELD_TAGS,
};
use serde_json::json;

fn fresh_item() -> HarvestItem {
    HarvestItem {
        id: Some(ItemId::from_str("item-1")),
        base_url: Some("https://s3.amazonaws.com/b/u@example.com/g1/Title/".into()),
        title: Some("Title".into()),
        harvest_state: Some(HarvestState::New),
        uploader: Some(Uploader { id: OwnerId::from_str("owner-1") }),
        tags: vec!["bookshelf:Guatemala".into()],
        ..Default::default()
    }
}

#[test]
fn test_item_serializes_with_backend_field_names() {
    let item = fresh_item();
    let v = serde_json::to_value(&item).unwrap();
    assert_eq!(v["objectId"], json!("item-1"));
    assert_eq!(v["harvestState"], json!("New"));
    assert_eq!(v["uploader"]["objectId"], json!("owner-1"));
    assert!(v.get("show").is_none());
}

#[test]
fn test_item_id_new_is_unique() {
    assert_ne!(ItemId::new(), ItemId::new());
}

#[test]
fn test_classification_payload_into_update() {
    let mut item = fresh_item();
    item.add_tag("bookshelf:Comics");
    item.set_tag("computedLevel", "2");
    item.set_harvester_evaluation(Channel::Epub, true);

    let mut op = UpdateOperation::new();
    op.set(FIELD_HARVEST_STATE, HarvestState::Done.as_str())
        .set(FIELD_TAGS, item.tags.clone())
        .set(FIELD_SHOW, item.show.to_value());

    assert_eq!(op.get(FIELD_TAGS), Some(&json!(["bookshelf:Guatemala", "bookshelf:Comics", "computedLevel:2"])));
    assert_eq!(op.get(FIELD_SHOW), Some(&json!({"epub": {"harvester": true}})));
    assert_eq!(TagMap::parse(&item.tags).get("bookshelf").map(|v| v.len()), Some(2));
}

#[test]
fn test_fresh_item_needs_harvest() {
    assert!(HarvesterVersion::CURRENT.needs_harvest(&fresh_item()));
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Channel, EpochMs, Environment, HarvestState, ItemId, LogEntry, LogKind, OwnerId, TagMap, VisibilitySettings,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uploader {
    #[serde(rename = "objectId")]
    pub id: OwnerId,
}

/// One item row as read from the backend.
///
/// Field names follow the backend's camelCase JSON. Everything except the
/// object id is optional on the wire, so a partially filled row still loads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestItem {
    #[serde(rename = "objectId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub harvest_state: Option<HarvestState>,
    #[serde(default)]
    pub harvester_id: Option<String>,
    #[serde(default)]
    pub harvester_major_version: u32,
    #[serde(default)]
    pub harvester_minor_version: u32,
    #[serde(default)]
    pub harvest_started_at: Option<EpochMs>,
    #[serde(rename = "harvestLog", default)]
    pub harvest_log: Vec<String>,
    #[serde(default)]
    pub uploader: Option<Uploader>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "VisibilitySettings::is_empty")]
    pub show: VisibilitySettings,
    #[serde(rename = "phashOfFirstContentImage", default)]
    pub phash_of_first_content_image: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Fields this worker does not read, kept so a row survives a round trip.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl HarvestItem {
    /// Stable key used to recognise repeat alerts for the same item.
    pub fn identity_key(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.id.as_ref().map(|id| id.as_str()))
    }

    pub fn owner_key(&self) -> Option<&str> {
        self.uploader.as_ref().map(|u| u.id.as_str())
    }

    pub fn label(&self) -> &str {
        self.identity_key().unwrap_or("<unidentified item>")
    }

    pub fn tag_map(&self) -> TagMap {
        TagMap::parse(&self.tags)
    }

    /// Sets a single-valued tag such as `computedLevel`.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        let mut map = self.tag_map();
        map.set(key, value);
        self.tags = map.to_tags();
    }

    /// Merges a raw `key:value` tag into the existing tags.
    pub fn add_tag(&mut self, raw: &str) {
        let mut map = self.tag_map();
        map.add_raw(raw);
        self.tags = map.to_tags();
    }

    pub fn set_harvester_evaluation(&mut self, channel: Channel, visible: bool) {
        self.show.set_harvester(channel, visible);
    }

    pub fn append_log(&mut self, entry: LogEntry) {
        self.harvest_log.push(entry.to_string());
    }

    pub fn valid_log_entries(&self) -> impl Iterator<Item = LogEntry> + '_ {
        self.harvest_log.iter().filter_map(|l| LogEntry::parse(l))
    }

    pub fn missing_fonts(&self) -> Vec<String> {
        self.valid_log_entries()
            .filter(|e| e.kind == LogKind::MissingFont)
            .map(|e| e.message)
            .collect()
    }

    /// Library page for this item, if it has an object id.
    pub fn detail_link(&self, env: Environment) -> Option<String> {
        let id = self.id.as_ref().filter(|id| !id.as_str().trim().is_empty())?;
        Some(format!("https://{}/browse/detail/{}", env.library_host(), id))
    }

    /// Short description for incident reports. `env` is the environment of
    /// the item's database, not of the worker.
    pub fn diagnostic_info(&self, env: Environment) -> String {
        format!(
            "ItemId: {}\nURL: {}\nTitle: {}",
            self.id.as_ref().map(|i| i.as_str()).unwrap_or(""),
            self.detail_link(env).unwrap_or_else(|| "No URL".to_string()),
            self.title.as_deref().unwrap_or(""),
        )
    }
}

/// Warnings shown to readers alongside the item.
pub fn find_item_warnings(item: &HarvestItem) -> Vec<String> {
    let mut warnings = Vec::new();
    match item.base_url.as_deref() {
        None => warnings.push("Missing baseUrl".to_string()),
        Some(url) if url.trim().is_empty() => warnings.push("Missing baseUrl".to_string()),
        Some(url) => {
            if url.contains("gmail") {
                warnings.push("Gmail user".to_string());
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_backend_row() {
        let item: HarvestItem = serde_json::from_value(json!({
            "objectId": "abc123",
            "baseUrl": "https://s3.amazonaws.com/b/u%40x.com/guid/Title/",
            "title": "Title",
            "harvestState": "New",
            "uploader": {"objectId": "owner1"},
            "tags": ["system:Incoming"],
            "show": {"epub": {"user": true}},
            "someFieldWeDoNotModel": 5,
        }))
        .unwrap();
        assert_eq!(item.id, Some(ItemId::from_str("abc123")));
        assert_eq!(item.harvest_state, Some(HarvestState::New));
        assert_eq!(item.owner_key(), Some("owner1"));
        assert_eq!(item.show.channel(Channel::Epub).unwrap().get("user"), Some(true));
        assert!(item.harvest_log.is_empty());
        assert_eq!(item.other.get("someFieldWeDoNotModel"), Some(&json!(5)));
        assert_eq!(serde_json::to_value(&item).unwrap()["someFieldWeDoNotModel"], json!(5));
    }

    #[test]
    fn identity_prefers_base_url_then_object_id() {
        let mut item = HarvestItem { id: Some(ItemId::from_str("id1")), ..Default::default() };
        assert_eq!(item.identity_key(), Some("id1"));
        item.base_url = Some("  ".into());
        assert_eq!(item.identity_key(), Some("id1"));
        item.base_url = Some("https://x/y".into());
        assert_eq!(item.identity_key(), Some("https://x/y"));
        assert_eq!(HarvestItem::default().identity_key(), None);
    }

    #[test]
    fn add_tag_merges_with_existing_key() {
        let mut item = HarvestItem { tags: vec!["bookshelf:Guatemala".into()], ..Default::default() };
        item.add_tag("bookshelf:Comics");
        assert_eq!(item.tags, vec!["bookshelf:Guatemala", "bookshelf:Comics"]);
    }

    #[test]
    fn set_tag_replaces_computed_level() {
        let mut item = HarvestItem { tags: vec!["system:Incoming".into(), "computedLevel:2".into()], ..Default::default() };
        item.set_tag("computedLevel", "3");
        assert_eq!(item.tags, vec!["system:Incoming", "computedLevel:3"]);
    }

    #[test]
    fn missing_fonts_skip_unparseable_lines() {
        let mut item = HarvestItem { harvest_log: vec!["free text".into()], ..Default::default() };
        item.append_log(LogEntry::new(LogKind::MissingFont, "Andika"));
        item.append_log(LogEntry::new(LogKind::Warn, "slow"));
        assert_eq!(item.missing_fonts(), vec!["Andika"]);
    }

    #[test]
    fn detail_link_needs_object_id() {
        let mut item = HarvestItem::default();
        assert_eq!(item.detail_link(Environment::Prod), None);
        assert!(item.diagnostic_info(Environment::Prod).contains("No URL"));
        item.id = Some(ItemId::from_str("xyz"));
        assert_eq!(
            item.detail_link(Environment::Dev).as_deref(),
            Some("https://dev.library.example.org/browse/detail/xyz")
        );
    }

    #[test]
    fn warnings_for_missing_and_gmail_urls() {
        assert_eq!(find_item_warnings(&HarvestItem::default()), vec!["Missing baseUrl"]);
        let gmail = HarvestItem { base_url: Some("https://s3/b/someone@gmail.com/g/T".into()), ..Default::default() };
        assert_eq!(find_item_warnings(&gmail), vec!["Gmail user"]);
        let plain = HarvestItem { base_url: Some("https://s3/b/someone@example.com/g/T".into()), ..Default::default() };
        assert!(find_item_warnings(&plain).is_empty());
    }
}

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub const FIELD_HARVEST_STATE: &str = "harvestState";
pub const FIELD_HARVESTER_ID: &str = "harvesterId";
pub const FIELD_HARVESTER_MAJOR_VERSION: &str = "harvesterMajorVersion";
pub const FIELD_HARVESTER_MINOR_VERSION: &str = "harvesterMinorVersion";
pub const FIELD_HARVEST_STARTED_AT: &str = "harvestStartedAt";
pub const FIELD_HARVEST_LOG: &str = "harvestLog";
pub const FIELD_WARNINGS: &str = "warnings";
pub const FIELD_TAGS: &str = "tags";
pub const FIELD_SHOW: &str = "show";
pub const FIELD_PHASH: &str = "phashOfFirstContentImage";
pub const FIELD_UPDATE_SOURCE: &str = "updateSource";

/// Marks a write as coming from this worker rather than from an uploader.
pub const UPDATE_SOURCE: &str = "harvester";

/// A field-level partial update of one item.
///
/// Only the listed fields are written; the backend merges them into the
/// stored record and leaves every other field alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOperation {
    fields: BTreeMap<String, Value>,
}

impl UpdateOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Adds the `updateSource` marker if there is anything to write.
    pub fn with_update_source(mut self) -> Self {
        if !self.fields.is_empty() {
            self.fields.insert(FIELD_UPDATE_SOURCE.to_string(), Value::String(UPDATE_SOURCE.to_string()));
        }
        self
    }

    /// Merges the listed fields into a stored JSON document.
    pub fn apply_to(&self, doc: &mut Map<String, Value>) {
        for (k, v) in &self.fields {
            doc.insert(k.clone(), v.clone());
        }
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Channel;

/// The sub-flag this worker is allowed to write.
pub const HARVESTER_FLAG: &str = "harvester";

/// Per-channel sub-flags, e.g. `{"harvester": true, "librarian": false}`.
///
/// Sub-flags other than [`HARVESTER_FLAG`] belong to other actors (uploader,
/// librarian) and are carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelFlags(pub BTreeMap<String, bool>);

impl ChannelFlags {
    pub fn get(&self, flag: &str) -> Option<bool> {
        self.0.get(flag).copied()
    }
}

/// Visibility settings for an item, keyed by channel name.
///
/// Keyed by the wire name rather than [`Channel`] so channels added by other
/// actors round-trip even if this worker does not know them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisibilitySettings(pub BTreeMap<String, ChannelFlags>);

impl VisibilitySettings {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelFlags> {
        self.0.get(channel.as_str())
    }

    pub fn harvester(&self, channel: Channel) -> Option<bool> {
        self.channel(channel).and_then(|c| c.get(HARVESTER_FLAG))
    }

    /// Sets only the harvester sub-flag of `channel`, creating the channel
    /// entry if needed. All other sub-flags are preserved.
    pub fn set_harvester(&mut self, channel: Channel, value: bool) {
        self.0
            .entry(channel.as_str().to_string())
            .or_default()
            .0
            .insert(HARVESTER_FLAG.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for (channel, flags) in &self.0 {
            let inner: Map<String, Value> = flags.0.iter().map(|(k, v)| (k.clone(), Value::Bool(*v))).collect();
            out.insert(channel.clone(), Value::Object(inner));
        }
        Value::Object(out)
    }
}

/// Classification tags stored on an item as `key:value` strings.
///
/// Tags that share a key are merged into one entry holding an ordered list of
/// values. Keys keep the order in which they were first seen, and values keep
/// insertion order (duplicates included). A tag without a separator is kept as
/// a bare key with no values so it survives a round trip unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<(String, Vec<String>)>,
}

pub const TAG_SEPARATOR: char = ':';

/// Splits `key:value` on the first separator, trimming both sides.
pub fn split_tag(raw: &str) -> (String, Option<String>) {
    match raw.split_once(TAG_SEPARATOR) {
        Some((k, v)) => (k.trim().to_string(), Some(v.trim().to_string())),
        None => (raw.trim().to_string(), None),
    }
}

impl TagMap {
    pub fn parse<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut map = TagMap::default();
        for raw in tags {
            let raw = raw.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            match split_tag(raw) {
                (key, Some(value)) => map.add(&key, &value),
                (key, None) => {
                    map.entry_mut(&key);
                }
            }
        }
        map
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn entry_mut(&mut self, key: &str) -> &mut Vec<String> {
        let idx = match self.position(key) {
            Some(i) => i,
            None => {
                self.entries.push((key.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Appends `value` to the list under `key`.
    pub fn add(&mut self, key: &str, value: &str) {
        self.entry_mut(key).push(value.to_string());
    }

    /// Parses a raw `key:value` tag and merges it in.
    pub fn add_raw(&mut self, raw: &str) {
        match split_tag(raw) {
            (key, Some(value)) => self.add(&key, &value),
            (key, None) => {
                self.entry_mut(&key);
            }
        }
    }

    /// Sets a single value for `key`.
    ///
    /// An existing single value is replaced. When the key already holds more
    /// than one value the new value is merged into the list instead.
    pub fn set(&mut self, key: &str, value: &str) {
        let values = self.entry_mut(key);
        if values.len() == 1 {
            values[0] = value.to_string();
        } else {
            values.push(value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|i| self.entries[i].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens back into `key:value` strings.
    pub fn to_tags(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (key, values) in &self.entries {
            if values.is_empty() {
                out.push(key.clone());
            }
            for v in values {
                out.push(format!("{}{}{}", key, TAG_SEPARATOR, v));
            }
        }
        out
    }
}

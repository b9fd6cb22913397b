use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MANIFEST_FILE: &str = "upload_manifest.json";

/// One object written to the output bucket.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadRecord {
    /// Destination key inside the bucket, `/`-separated.
    pub key: String,
    pub bytes: u64,
    pub sha256: String,
}

impl UploadRecord {
    pub fn for_file(key: String, path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Ok(Self { key, bytes: data.len() as u64, sha256: sha256_hex(&data) })
    }
}

/// Everything uploaded for one item, in upload order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadManifest {
    pub item_id: Option<String>,
    pub bucket: String,
    pub prefix: String,
    pub uploads: Vec<UploadRecord>,
}

impl UploadManifest {
    pub fn new(bucket: &str, prefix: &str) -> Self {
        Self { bucket: bucket.to_string(), prefix: prefix.to_string(), ..Default::default() }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = UploadRecord>) {
        self.uploads.extend(records);
    }

    pub fn total_bytes(&self) -> u64 {
        self.uploads.iter().map(|u| u.bytes).sum()
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

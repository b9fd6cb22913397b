use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::manifest::{UploadManifest, UploadRecord, MANIFEST_FILE};

/// Destination for produced artifacts. Any error is a processing failure
/// for the item being harvested.
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Uploads one file to `<dest_prefix>/<file name>`.
    fn upload_file(&self, local: &Path, dest_prefix: &str) -> Result<UploadRecord>;

    /// Uploads every file under `local_dir`, keeping relative paths.
    fn upload_directory(&self, local_dir: &Path, dest_prefix: &str) -> Result<Vec<UploadRecord>>;

    fn write_manifest(&self, manifest: &UploadManifest) -> Result<()>;
}

/// Object store backed by a local directory, one subdirectory per bucket.
#[derive(Clone)]
pub struct FsObjectStore {
    pub root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new(root: PathBuf, bucket: impl Into<String>) -> Self {
        Self { root, bucket: bucket.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.join(&self.bucket);
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn copy_to(&self, local: &Path, key: String) -> Result<UploadRecord> {
        let dest = self.path_for(&key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::copy(local, &dest).with_context(|| format!("upload {} to {}", local.display(), dest.display()))?;
        let record = UploadRecord::for_file(key, &dest)?;
        debug!(bucket = %self.bucket, key = %record.key, bytes = record.bytes, "uploaded");
        Ok(record)
    }
}

pub fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let rest = rest.trim_matches('/');
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{rest}"),
    }
}

impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload_file(&self, local: &Path, dest_prefix: &str) -> Result<UploadRecord> {
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("no file name in {}", local.display()))?;
        self.copy_to(local, join_key(dest_prefix, name))
    }

    fn upload_directory(&self, local_dir: &Path, dest_prefix: &str) -> Result<Vec<UploadRecord>> {
        if !local_dir.is_dir() {
            anyhow::bail!("not a directory: {}", local_dir.display());
        }
        let mut records = vec![];
        for entry in WalkDir::new(local_dir).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(local_dir)?;
            let rel_key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            records.push(self.copy_to(entry.path(), join_key(dest_prefix, &rel_key))?);
        }
        Ok(records)
    }

    fn write_manifest(&self, manifest: &UploadManifest) -> Result<()> {
        let path = self.path_for(&join_key(&manifest.prefix, MANIFEST_FILE));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(manifest)?;
        std::fs::write(&path, bytes).with_context(|| format!("write manifest {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keys_are_joined_without_doubled_slashes() {
        assert_eq!(join_key("a/b/", "/epub"), "a/b/epub");
        assert_eq!(join_key("", "x.epub"), "x.epub");
        assert_eq!(join_key("a", ""), "a");
    }

    #[test]
    fn uploads_file_and_directory_into_bucket() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let store = FsObjectStore::new(out.path().to_path_buf(), "library-harvest-sandbox");

        let epub = src.path().join("Title.epub");
        std::fs::write(&epub, b"epub").unwrap();
        let rec = store.upload_file(&epub, "me@x.org/guid/epub").unwrap();
        assert_eq!(rec.key, "me@x.org/guid/epub/Title.epub");
        assert!(out.path().join("library-harvest-sandbox/me@x.org/guid/epub/Title.epub").exists());

        let digital = src.path().join("digital");
        std::fs::create_dir_all(digital.join("audio")).unwrap();
        std::fs::write(digital.join("index.htm"), b"<html/>").unwrap();
        std::fs::write(digital.join("audio/a.mp3"), b"mp3").unwrap();
        let recs = store.upload_directory(&digital, "me@x.org/guid/bloomdigital").unwrap();
        let keys: Vec<_> = recs.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["me@x.org/guid/bloomdigital/audio/a.mp3", "me@x.org/guid/bloomdigital/index.htm"]);
    }

    #[test]
    fn upload_of_missing_file_fails() {
        let out = tempdir().unwrap();
        let store = FsObjectStore::new(out.path().to_path_buf(), "b");
        assert!(store.upload_file(&out.path().join("nope.epub"), "p").is_err());
        assert!(store.upload_directory(&out.path().join("nope"), "p").is_err());
    }

    #[test]
    fn writes_manifest_under_prefix() {
        let out = tempdir().unwrap();
        let store = FsObjectStore::new(out.path().to_path_buf(), "b");
        let mut manifest = UploadManifest::new("b", "s/g");
        manifest.extend([UploadRecord { key: "s/g/x".into(), bytes: 1, sha256: "00".into() }]);
        store.write_manifest(&manifest).unwrap();
        let written: UploadManifest =
            serde_json::from_slice(&std::fs::read(out.path().join("b/s/g").join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(written, manifest);
    }
}

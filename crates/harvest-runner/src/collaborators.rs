use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use harvest_core::{parse_perceptual_hash, Channel, HarvestItem, LogEntry, LogKind};
use tracing::debug;
use walkdir::WalkDir;

/// Fetches an item's source files.
pub trait ItemDownloader: Send + Sync {
    /// `url` is the decoded base URL without its title segment. Returns the
    /// directory holding the item's files.
    fn download(&self, url: &str, dest_root: &Path) -> Result<PathBuf>;
}

/// Converts and classifies a downloaded item.
pub trait ItemProcessor: Send + Sync {
    fn process(&self, item: &HarvestItem, item_dir: &Path, work_dir: &Path) -> Result<ProcessedItem>;
}

/// What processing produced: files to upload plus the classification
/// results written with the `Done` checkpoint.
#[derive(Clone, Debug, Default)]
pub struct ProcessedItem {
    /// Packaged reader file, uploaded next to the item prefix.
    pub package: Option<PathBuf>,
    /// Unpacked reader output, uploaded under `bloomdigital/`.
    pub digital_dir: Option<PathBuf>,
    /// Uploaded under `epub/`.
    pub epub: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub computed_level: Option<String>,
    /// Harvester verdict per channel.
    pub visibility: Vec<(Channel, bool)>,
    pub phash: Option<String>,
    pub log: Vec<LogEntry>,
}

/// Splits `scheme://host/bucket/a/b` into `["bucket", "a", "b"]`.
fn key_segments(url: &str) -> Vec<&str> {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => url,
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).with_context(|| format!("create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {} to {}", entry.path().display(), target.display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Downloads from a local mirror of the source buckets laid out as
/// `<root>/<bucket>/<submitter>/<guid>/<title>/...`.
#[derive(Clone)]
pub struct FsDownloader {
    pub source_root: PathBuf,
}

impl FsDownloader {
    pub fn new(source_root: PathBuf) -> Self {
        Self { source_root }
    }
}

impl ItemDownloader for FsDownloader {
    fn download(&self, url: &str, dest_root: &Path) -> Result<PathBuf> {
        let segments = key_segments(url);
        if segments.len() < 3 {
            return Err(anyhow!("not an item url: {url}"));
        }
        let mut src = self.source_root.clone();
        for s in &segments {
            src.push(s);
        }
        if !src.is_dir() {
            return Err(anyhow!("item not found in source bucket: {}", src.display()));
        }

        let dest = dest_root.join(segments[segments.len() - 1]);
        if dest.exists() {
            std::fs::remove_dir_all(&dest).with_context(|| format!("clear {}", dest.display()))?;
        }
        let copied = copy_tree(&src, &dest)?;
        debug!(from = %src.display(), to = %dest.display(), files = copied, "downloaded item");

        // the item itself is the single title folder under the guid
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&dest)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs.into_iter().next().ok_or_else(|| anyhow!("no item folder under {}", dest.display()))
    }
}

/// Processor for items already prepared as HTML folders.
///
/// Copies the folder as the reader output with its main page renamed to
/// `index.htm`, passes through a prebuilt `.epub`/`.bloomd`, and reads the
/// optional `phash.txt` and `level.txt` sidecars.
#[derive(Clone, Copy, Default)]
pub struct LocalProcessor;

fn find_with_extension(dir: &Path, ext: &str) -> Result<Option<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

fn read_sidecar(dir: &Path, name: &str) -> Result<Option<String>> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?))
}

impl ItemProcessor for LocalProcessor {
    fn process(&self, _item: &HarvestItem, item_dir: &Path, work_dir: &Path) -> Result<ProcessedItem> {
        let html = find_with_extension(item_dir, "htm")?
            .ok_or_else(|| anyhow!("no .htm file in {}", item_dir.display()))?;

        let digital = work_dir.join("digital");
        if digital.exists() {
            std::fs::remove_dir_all(&digital)?;
        }
        let copied = copy_tree(item_dir, &digital)?;
        let html_name = html.file_name().ok_or_else(|| anyhow!("bad html path"))?;
        if html_name != "index.htm" {
            std::fs::rename(digital.join(html_name), digital.join("index.htm"))?;
        }

        let mut out = ProcessedItem {
            package: find_with_extension(item_dir, "bloomd")?,
            epub: find_with_extension(item_dir, "epub")?,
            ..Default::default()
        };
        out.log.push(LogEntry::new(LogKind::Info, format!("copied {copied} files")));

        out.visibility = vec![
            (Channel::ReadOnline, true),
            (Channel::BloomReader, true),
            (Channel::Epub, out.epub.is_some()),
            (Channel::Pdf, find_with_extension(item_dir, "pdf")?.is_some()),
        ];
        if out.epub.is_none() {
            out.log.push(LogEntry::new(LogKind::Warn, "no epub available"));
        }

        out.phash = read_sidecar(item_dir, "phash.txt")?.as_deref().and_then(parse_perceptual_hash);
        out.computed_level = read_sidecar(item_dir, "level.txt")?
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        out.digital_dir = Some(digital);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_source(root: &Path) -> PathBuf {
        let item = root.join("library-items-sandbox/me@x.org/guid-1/My Book");
        std::fs::create_dir_all(item.join("audio")).unwrap();
        std::fs::write(item.join("My Book.htm"), "<html/>").unwrap();
        std::fs::write(item.join("audio/p1.mp3"), "mp3").unwrap();
        std::fs::write(item.join("phash.txt"), "0xABCD\r\n").unwrap();
        std::fs::write(item.join("level.txt"), "3\n").unwrap();
        item
    }

    #[test]
    fn key_segments_skip_scheme_and_host() {
        assert_eq!(key_segments("https://s3.amazonaws.com/b/me@x.org/g"), vec!["b", "me@x.org", "g"]);
        assert_eq!(key_segments("b/s/g/"), vec!["b", "s", "g"]);
    }

    #[test]
    fn downloads_title_folder() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        seed_source(src.path());
        let dl = FsDownloader::new(src.path().to_path_buf());
        let dir = dl
            .download("https://s3.amazonaws.com/library-items-sandbox/me@x.org/guid-1", dest.path())
            .unwrap();
        assert_eq!(dir, dest.path().join("guid-1/My Book"));
        assert!(dir.join("audio/p1.mp3").exists());
    }

    #[test]
    fn download_of_missing_item_fails() {
        let src = tempdir().unwrap();
        let dl = FsDownloader::new(src.path().to_path_buf());
        assert!(dl.download("https://h/b/s/g", src.path()).is_err());
        assert!(dl.download("https://h/b", src.path()).is_err());
    }

    #[test]
    fn local_processor_renames_main_page_and_reads_sidecars() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let item_dir = seed_source(src.path());
        let out = LocalProcessor.process(&HarvestItem::default(), &item_dir, work.path()).unwrap();

        let digital = out.digital_dir.unwrap();
        assert!(digital.join("index.htm").exists());
        assert!(!digital.join("My Book.htm").exists());
        assert_eq!(out.phash.as_deref(), Some("0xABCD"));
        assert_eq!(out.computed_level.as_deref(), Some("3"));
        assert!(out.visibility.contains(&(Channel::Epub, false)));
        assert!(out.epub.is_none());
    }

    #[test]
    fn local_processor_fails_without_html() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        assert!(LocalProcessor.process(&HarvestItem::default(), src.path(), work.path()).is_err());
    }
}

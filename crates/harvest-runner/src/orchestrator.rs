use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use harvest_alerts::{AlertGate, AlertRecord};
use harvest_artifacts::{join_key, ObjectStore, UploadManifest};
use harvest_core::{
    find_item_warnings, now_ms, BatchId, percent_decode, remove_title_from_base_url, Environment, HarvestItem, HarvestState,
    HarvesterVersion, ItemId, UpdateOperation, UrlComponents, FIELD_HARVESTER_ID, FIELD_HARVESTER_MAJOR_VERSION,
    FIELD_HARVESTER_MINOR_VERSION, FIELD_HARVEST_LOG, FIELD_HARVEST_STARTED_AT, FIELD_HARVEST_STATE, FIELD_PHASH,
    FIELD_SHOW, FIELD_TAGS, FIELD_WARNINGS,
};
use harvest_incidents::{IncidentReport, IncidentTracker, Notifier};
use harvest_storage::{ItemCursor, ItemQuery, ItemStore};
use tracing::{debug, error, info, warn};

use crate::collaborators::{ItemDownloader, ItemProcessor};

pub const COMPUTED_LEVEL_TAG: &str = "computedLevel";

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ItemStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub downloader: Arc<dyn ItemDownloader>,
    pub processor: Arc<dyn ItemProcessor>,
    pub incidents: Arc<dyn IncidentTracker>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Clone, Debug)]
pub struct HarvestOptions {
    pub worker_id: String,
    pub environment: Environment,
    pub download_root: PathBuf,
    pub read_only: bool,
    pub skip_current: bool,
    pub version: HarvesterVersion,
}

impl HarvestOptions {
    pub fn new(worker_id: impl Into<String>, environment: Environment, download_root: PathBuf) -> Self {
        Self {
            worker_id: worker_id.into(),
            environment,
            download_root,
            read_only: false,
            skip_current: false,
            version: HarvesterVersion::CURRENT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Done { uploads: usize },
    /// Read-only run: downloaded, nothing written.
    Downloaded,
    /// Stored version is current; nothing to do.
    Skipped,
}

/// A failed item. `primary` is always the error that stopped processing;
/// a failure to record the `Failed` state is kept on the side and never
/// replaces it.
#[derive(Debug)]
pub struct ItemFailure {
    pub item: String,
    pub primary: anyhow::Error,
    pub write_back: Option<anyhow::Error>,
    pub alert_silenced: bool,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "harvest of {} failed", self.item)
    }
}

impl std::error::Error for ItemFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let primary: &(dyn std::error::Error + 'static) = self.primary.as_ref();
        Some(primary)
    }
}

#[derive(Debug)]
pub struct HarvestSummary {
    pub batch: BatchId,
    pub done: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl HarvestSummary {
    fn new(batch: BatchId) -> Self {
        Self { batch, done: 0, downloaded: 0, skipped: 0, failures: vec![] }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn attempted(&self) -> usize {
        self.done + self.downloaded + self.failed()
    }
}

/// One line of the warnings report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemWarnings {
    pub id: Option<ItemId>,
    pub base_url: Option<String>,
    pub warnings: Vec<String>,
}

impl fmt::Display for ItemWarnings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} warnings.",
            self.id.as_ref().map(|i| i.as_str()).unwrap_or(""),
            self.base_url.as_deref().unwrap_or(""),
            self.warnings.len()
        )
    }
}

/// Drives items one at a time through
/// `InProgress -> (download, process, upload) -> Done`, or `Failed`.
pub struct HarvestOrchestrator {
    opts: HarvestOptions,
    deps: Collaborators,
    alerts: Arc<AlertGate>,
}

impl HarvestOrchestrator {
    pub fn new(opts: HarvestOptions, deps: Collaborators, alerts: Arc<AlertGate>) -> Self {
        Self { opts, deps, alerts }
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.opts
    }

    /// Processes every item matching `query`, stopping after `max_count`
    /// attempts when `max_count > 0`. A failed item is counted and the batch
    /// moves on; only a failing query aborts the batch.
    ///
    /// Items are read from the store one at a time, just before each is
    /// processed, so writes made meanwhile by other workers are seen.
    pub fn harvest_all(&self, max_count: usize, query: &ItemQuery) -> Result<HarvestSummary> {
        let started = now_ms();
        let mut summary = HarvestSummary::new(BatchId::new());
        info!(batch = %summary.batch, worker = %self.opts.worker_id, env = %self.opts.environment, "harvest all: start");

        // skipped items do not count towards max_count, so only bound the scan
        // when nothing can be skipped
        let mut query = query.clone();
        if max_count > 0 && !self.opts.skip_current {
            query = query.with_limit(max_count);
        }
        let items = ItemCursor::new(self.deps.store.as_ref(), query).with_page_size(1);

        for item in items {
            let item = item.context("query items")?;
            match self.process_item(&item) {
                Ok(ItemOutcome::Done { .. }) => summary.done += 1,
                Ok(ItemOutcome::Downloaded) => summary.downloaded += 1,
                Ok(ItemOutcome::Skipped) => summary.skipped += 1,
                Err(failure) => summary.failures.push(failure),
            }
            if max_count > 0 && summary.attempted() >= max_count {
                break;
            }
        }

        info!(
            batch = %summary.batch,
            done = summary.done,
            failed = summary.failed(),
            skipped = summary.skipped,
            downloaded = summary.downloaded,
            elapsed_ms = now_ms() - started,
            "harvest all: end"
        );
        Ok(summary)
    }

    /// Items that carry warnings.
    pub fn harvest_warnings(&self) -> Result<Vec<ItemWarnings>> {
        let items = self.deps.store.query_items(&ItemQuery::with_warnings()).context("query items with warnings")?;
        Ok(items
            .into_iter()
            .map(|i| ItemWarnings { id: i.id, base_url: i.base_url, warnings: i.warnings })
            .collect())
    }

    pub fn process_item(&self, item: &HarvestItem) -> Result<ItemOutcome, ItemFailure> {
        if self.opts.skip_current && !self.opts.version.needs_harvest(item) {
            debug!(item = %item.label(), "up to date; skipping");
            return Ok(ItemOutcome::Skipped);
        }
        info!(item = %item.label(), "processing");
        self.run(item).map_err(|primary| self.fail(item, primary))
    }

    fn run(&self, item: &HarvestItem) -> Result<ItemOutcome> {
        if !self.opts.read_only {
            let id = self.require_id(item)?;
            self.deps.store.update_item(&id, &self.start_update()).context("mark item in progress")?;
        }

        let base_url = item
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow!("item has no baseUrl"))?;
        let decoded = percent_decode(base_url);
        let item_dir = self
            .deps
            .downloader
            .download(&remove_title_from_base_url(&decoded), &self.opts.download_root)
            .context("download item")?;
        if self.opts.read_only {
            info!(item = %item.label(), dir = %item_dir.display(), "read-only: downloaded");
            return Ok(ItemOutcome::Downloaded);
        }

        let components = UrlComponents::parse(&decoded).ok_or_else(|| anyhow!("unrecognised baseUrl: {decoded}"))?;
        let work_dir = self.opts.download_root.join("output").join(&components.item_guid);
        std::fs::create_dir_all(&work_dir).with_context(|| format!("create {}", work_dir.display()))?;
        let processed = self.deps.processor.process(item, &item_dir, &work_dir).context("process item")?;

        let prefix = components.output_prefix();
        let mut manifest = UploadManifest::new(self.deps.objects.bucket(), &prefix);
        manifest.item_id = item.id.as_ref().map(|i| i.as_str().to_string());
        if let Some(package) = &processed.package {
            manifest.extend([self.deps.objects.upload_file(package, &prefix).context("upload package")?]);
        }
        if let Some(dir) = &processed.digital_dir {
            let dest = join_key(&prefix, "bloomdigital");
            manifest.extend(self.deps.objects.upload_directory(dir, &dest).context("upload bloomdigital")?);
        }
        if let Some(epub) = &processed.epub {
            let dest = join_key(&prefix, "epub");
            manifest.extend([self.deps.objects.upload_file(epub, &dest).context("upload epub")?]);
        }
        self.deps.objects.write_manifest(&manifest).context("write upload manifest")?;

        let mut result = item.clone();
        for (channel, visible) in &processed.visibility {
            result.set_harvester_evaluation(*channel, *visible);
        }
        if let Some(level) = &processed.computed_level {
            result.set_tag(COMPUTED_LEVEL_TAG, level);
        }
        for entry in &processed.log {
            result.append_log(entry.clone());
        }
        let mut warnings = find_item_warnings(item);
        for w in processed.warnings {
            if !warnings.contains(&w) {
                warnings.push(w);
            }
        }

        let mut done = UpdateOperation::new();
        done.set(FIELD_HARVEST_STATE, HarvestState::Done.as_str())
            .set(FIELD_WARNINGS, warnings)
            .set(FIELD_TAGS, result.tags)
            .set(FIELD_SHOW, result.show.to_value())
            .set(FIELD_HARVEST_LOG, result.harvest_log);
        if let Some(phash) = processed.phash {
            done.set(FIELD_PHASH, phash);
        }
        let id = self.require_id(item)?;
        self.deps.store.update_item(&id, &done.with_update_source()).context("mark item done")?;

        info!(item = %item.label(), uploads = manifest.uploads.len(), bytes = manifest.total_bytes(), "done");
        Ok(ItemOutcome::Done { uploads: manifest.uploads.len() })
    }

    fn require_id(&self, item: &HarvestItem) -> Result<ItemId> {
        item.id.clone().ok_or_else(|| anyhow!("item {} has no object id", item.label()))
    }

    fn start_update(&self) -> UpdateOperation {
        let mut op = UpdateOperation::new();
        op.set(FIELD_HARVEST_STATE, HarvestState::InProgress.as_str())
            .set(FIELD_HARVESTER_ID, self.opts.worker_id.as_str())
            .set(FIELD_HARVEST_STARTED_AT, now_ms())
            .set(FIELD_HARVESTER_MAJOR_VERSION, self.opts.version.major)
            .set(FIELD_HARVESTER_MINOR_VERSION, self.opts.version.minor);
        op.with_update_source()
    }

    /// Failure path: report, record `Failed` (best effort), alert unless
    /// the gate silences it, then hand the original error back.
    fn fail(&self, item: &HarvestItem, primary: anyhow::Error) -> ItemFailure {
        error!(item = %item.label(), error = %format!("{primary:#}"), "processing failed");

        let report = IncidentReport::from_error(
            &primary,
            format!("Unhandled error while processing item \"{}\"", item.label()),
            &self.opts.worker_id,
            now_ms(),
        )
        .with_item_info(item.diagnostic_info(self.opts.environment));
        if let Err(e) = self.deps.incidents.submit(&report) {
            warn!(item = %item.label(), error = %format!("{e:#}"), "incident submission failed");
        }

        let write_back = match (&item.id, self.opts.read_only) {
            (_, true) => None,
            (None, false) => {
                debug!(item = %item.label(), "no object id; not recording failed state");
                None
            }
            (Some(id), false) => {
                let mut op = UpdateOperation::new();
                op.set(FIELD_HARVEST_STATE, HarvestState::Failed.as_str())
                    .set(FIELD_HARVESTER_ID, self.opts.worker_id.as_str());
                match self.deps.store.update_item(id, &op.with_update_source()) {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(item = %item.label(), error = %format!("{e:#}"), "could not record failed state");
                        Some(e)
                    }
                }
            }
        };

        let alert_silenced = self.alerts.record_and_should_silence(AlertRecord::for_item(self.alerts.now(), item));
        if !alert_silenced {
            if let Err(e) = self.deps.notifier.notify(&report) {
                warn!(item = %item.label(), error = %format!("{e:#}"), "alert delivery failed");
            }
        }

        ItemFailure { item: item.label().to_string(), primary, write_back, alert_silenced }
    }
}

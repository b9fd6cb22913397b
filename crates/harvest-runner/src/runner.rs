use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use harvest_alerts::AlertGate;
use harvest_artifacts::FsObjectStore;
use harvest_core::{Environment, HarvestItem};
use harvest_incidents::{FsIncidentTracker, LogNotifier};
use harvest_storage::{ItemQuery, ItemStore};
use harvest_storage_sqlite::SqliteStore;
use tracing::info;

use crate::collaborators::{FsDownloader, LocalProcessor};
use crate::orchestrator::{Collaborators, HarvestOptions, HarvestOrchestrator};
use crate::{default_worker_id, Config};

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub environment: Option<Environment>,
    pub read_only: Option<bool>,
}

/// A worker wired to the local backends under a repo root.
pub struct Harvester {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub store: Arc<SqliteStore>,
    pub orchestrator: HarvestOrchestrator,
}

impl Harvester {
    pub fn open(repo_root: PathBuf, overrides: &Overrides) -> Result<Self> {
        let cfg_path = Config::config_path(&repo_root);
        let mut cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_worker(&default_worker_id());
            cfg.save_to(&cfg_path)?;
            cfg
        };
        if let Some(env) = overrides.environment {
            cfg.environment.database = env;
        }
        if let Some(read_only) = overrides.read_only {
            cfg.worker.read_only = read_only;
        }

        let store = Arc::new(SqliteStore::open(&Config::db_path(&repo_root))?);
        let env = cfg.environment.database;
        let deps = Collaborators {
            store: store.clone(),
            objects: Arc::new(FsObjectStore::new(cfg.upload_root(&repo_root), env.output_bucket())),
            downloader: Arc::new(FsDownloader::new(cfg.source_root(&repo_root))),
            processor: Arc::new(LocalProcessor),
            incidents: Arc::new(FsIncidentTracker::new(cfg.incidents_dir(&repo_root))),
            notifier: Arc::new(LogNotifier),
        };

        let mut opts = HarvestOptions::new(cfg.worker.id.clone(), env, cfg.download_root(&repo_root));
        opts.read_only = cfg.worker.read_only;
        opts.skip_current = cfg.worker.skip_current;

        info!(
            worker = %cfg.worker.id,
            env = %env,
            log_env = %cfg.log_environment(),
            read_only = opts.read_only,
            "harvester opened"
        );
        let orchestrator = HarvestOrchestrator::new(opts, deps, Arc::new(AlertGate::new()));
        Ok(Self { repo_root, cfg, store, orchestrator })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_worker(&default_worker_id());
            cfg.save_to(&cfg_path)?;
            cfg
        };
        std::fs::create_dir_all(cfg.source_root(repo_root)).ok();
        std::fs::create_dir_all(cfg.incidents_dir(repo_root)).ok();
        // create db
        let _ = SqliteStore::open(&Config::db_path(repo_root))?;
        Ok(())
    }

    /// Loads items from a JSON or YAML list into the local backend.
    pub fn import_items(&self, path: &Path) -> Result<usize> {
        let items = load_items(path)?;
        let n = items.len();
        for item in items {
            self.store.insert_item(item)?;
        }
        info!(count = n, file = %path.display(), "imported items");
        Ok(n)
    }

    /// Item count per harvest state; items without a state count as `New`.
    pub fn status(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for item in self.store.query_items(&ItemQuery::all())? {
            let state = item.harvest_state.map(|s| s.as_str()).unwrap_or("New");
            *counts.entry(state.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

pub fn load_items(path: &Path) -> Result<Vec<HarvestItem>> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let items = if is_json {
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?
    } else {
        serde_yaml::from_str(&s).with_context(|| format!("parse {}", path.display()))?
    };
    Ok(items)
}

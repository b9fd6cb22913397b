use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use harvest_core::Environment;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub worker: WorkerConfig,
    pub environment: EnvironmentConfig,
    pub paths: PathsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Written to `harvesterId`; must differ between workers sharing a backend.
    pub id: String,
    /// Download only; never write results or upload.
    #[serde(default)]
    pub read_only: bool,
    /// Skip items whose stored harvester version says they are up to date.
    #[serde(default)]
    pub skip_current: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Which item database (and therefore which buckets) to use.
    pub database: Environment,
    /// Environment tag for log output. Falls back to `database`.
    #[serde(default)]
    pub log: Option<Environment>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    pub download_root: String,
    /// Local stand-in for the source bucket, one subdirectory per bucket.
    pub source_root: String,
    /// Local stand-in for the output bucket, one subdirectory per bucket.
    pub upload_root: String,
    pub incidents_dir: String,
}

impl Config {
    pub fn default_for_worker(worker_id: &str) -> Self {
        Self {
            worker: WorkerConfig { id: worker_id.to_string(), read_only: false, skip_current: false },
            environment: EnvironmentConfig { database: Environment::Dev, log: None },
            paths: PathsConfig {
                download_root: "~/.harvest/downloads".to_string(),
                source_root: ".harvest/source".to_string(),
                upload_root: ".harvest/uploads".to_string(),
                incidents_dir: ".harvest/incidents".to_string(),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse harvest.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn log_environment(&self) -> Environment {
        self.environment.log.unwrap_or(self.environment.database)
    }

    pub fn download_root(&self, repo_root: &Path) -> PathBuf {
        resolve(repo_root, &self.paths.download_root).join(&self.worker.id)
    }

    pub fn source_root(&self, repo_root: &Path) -> PathBuf {
        resolve(repo_root, &self.paths.source_root)
    }

    pub fn upload_root(&self, repo_root: &Path) -> PathBuf {
        resolve(repo_root, &self.paths.upload_root)
    }

    pub fn incidents_dir(&self, repo_root: &Path) -> PathBuf {
        resolve(repo_root, &self.paths.incidents_dir)
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".harvest").join("harvest.toml")
    }

    pub fn db_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".harvest").join("harvest.db")
    }
}

/// Expands `~` and anchors relative paths at `repo_root`.
pub fn resolve(repo_root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
    if expanded.is_absolute() {
        expanded
    } else {
        repo_root.join(expanded)
    }
}

/// Machine name, or a pid-based id when the host name is unknown.
pub fn default_worker_id() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| format!("harvester-{}", std::process::id()))
}

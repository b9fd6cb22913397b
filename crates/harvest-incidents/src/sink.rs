use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::report::{format_incident, IncidentReport};

/// Records failures for later triage.
///
/// Callers treat submission as fire-and-forget: an error here is logged,
/// never propagated in place of the failure being reported.
pub trait IncidentTracker: Send + Sync {
    fn submit(&self, report: &IncidentReport) -> Result<()>;
}

/// User-visible alert channel. Only called for alerts the gate lets through.
pub trait Notifier: Send + Sync {
    fn notify(&self, report: &IncidentReport) -> Result<()>;
}

/// Writes each incident as a markdown file named after its id.
#[derive(Clone)]
pub struct FsIncidentTracker {
    pub dir: PathBuf,
}

impl FsIncidentTracker {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, report: &IncidentReport) -> PathBuf {
        self.dir.join(format!("{}.md", report.id.as_str()))
    }
}

impl IncidentTracker for FsIncidentTracker {
    fn submit(&self, report: &IncidentReport) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| format!("create incidents dir {}", self.dir.display()))?;
        let path = self.path_for(report);
        std::fs::write(&path, format_incident(report)).with_context(|| format!("write incident {}", path.display()))?;
        info!(incident = %report.id, path = %path.display(), "incident recorded");
        Ok(())
    }
}

/// Notifier that raises the alert as a warning in the worker log.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, report: &IncidentReport) -> Result<()> {
        warn!(
            target: "harvest::alerts",
            incident = %report.id,
            worker = %report.worker_id,
            error = %report.error_message(),
            "{}",
            report.summary
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::IncidentId;
    use tempfile::tempdir;

    fn report() -> IncidentReport {
        let mut r = IncidentReport::from_error(&anyhow::anyhow!("boom"), "processing b1", "w1", 7);
        r.id = IncidentId::from_str("inc-1");
        r
    }

    #[test]
    fn tracker_writes_markdown_file() {
        let dir = tempdir().unwrap();
        let tracker = FsIncidentTracker::new(dir.path().join("incidents"));
        let r = report();
        tracker.submit(&r).unwrap();
        let body = std::fs::read_to_string(dir.path().join("incidents/inc-1.md")).unwrap();
        assert!(body.starts_with("# Incident: inc-1"));
        assert!(body.contains("- boom"));
    }

    #[test]
    fn log_notifier_never_fails() {
        assert!(LogNotifier.notify(&report()).is_ok());
    }
}

use harvest_core::{EpochMs, IncidentId};

/// What the incident tracker receives for one failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncidentReport {
    pub id: IncidentId,
    pub occurred_at: EpochMs,
    pub worker_id: String,
    /// One-line context, e.g. which item was being processed.
    pub summary: String,
    /// Error message followed by its causes, outermost first.
    pub error_chain: Vec<String>,
    /// Item diagnostic block (id, detail link, title), if there was an item.
    pub item_info: Option<String>,
}

impl IncidentReport {
    pub fn from_error(error: &anyhow::Error, summary: impl Into<String>, worker_id: &str, occurred_at: EpochMs) -> Self {
        Self {
            id: IncidentId::new(),
            occurred_at,
            worker_id: worker_id.to_string(),
            summary: summary.into(),
            error_chain: error.chain().map(|e| e.to_string()).collect(),
            item_info: None,
        }
    }

    pub fn with_item_info(mut self, info: String) -> Self {
        self.item_info = Some(info);
        self
    }

    pub fn error_message(&self) -> &str {
        self.error_chain.first().map(String::as_str).unwrap_or("")
    }
}

/// Markdown body of an incident.
pub fn format_incident(report: &IncidentReport) -> String {
    let mut s = String::new();
    s.push_str(&format!("# Incident: {}\n\n", report.id.as_str()));
    s.push_str(&format!("**Summary:** {}\n\n", report.summary));
    s.push_str(&format!("**Worker:** {}\n\n", report.worker_id));
    s.push_str(&format!("**Occurred at (ms):** {}\n\n", report.occurred_at));
    s.push_str("## Error\n");
    for (i, line) in report.error_chain.iter().enumerate() {
        if i == 0 {
            s.push_str(&format!("- {}\n", line));
        } else {
            s.push_str(&format!("- caused by: {}\n", line));
        }
    }
    if let Some(info) = &report.item_info {
        s.push_str("\n## Item\n");
        for line in info.lines() {
            s.push_str(&format!("    {}\n", line));
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_format_incident() {
        let err = Err::<(), _>(anyhow::anyhow!("disk full")).context("upload epub").unwrap_err();
        let mut report = IncidentReport::from_error(&err, "processing \"b1\"", "w1", 42)
            .with_item_info("ItemId: b1\nURL: No URL\nTitle: T".into());
        report.id = IncidentId::from_str("inc1");

        let expected = "# Incident: inc1\n\n**Summary:** processing \"b1\"\n\n**Worker:** w1\n\n**Occurred at (ms):** 42\n\n## Error\n- upload epub\n- caused by: disk full\n\n## Item\n    ItemId: b1\n    URL: No URL\n    Title: T\n";
        assert_eq!(format_incident(&report), expected);
        assert_eq!(report.error_message(), "upload epub");
    }
}

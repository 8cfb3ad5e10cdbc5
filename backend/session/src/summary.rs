//! Summary Writer: one JSON report per (session, agent) invocation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tokio::fs;
use tracing::{info, warn};

use crate::fsio::write_atomic;
use crate::layout::{validate_agent_name, validate_session_id, SessionLayout, SUMMARY_SUFFIX};
use crate::time::serde_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Completed,
    /// The runner reported an error or the invocation timed out.
    Failed,
    /// Bookkeeping failed on our side.
    Error,
}

impl SummaryStatus {
    pub fn is_success(self) -> bool {
        self == SummaryStatus::Completed
    }
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SummaryStatus::Completed => "completed",
            SummaryStatus::Failed => "failed",
            SummaryStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub session_id: String,
    pub agent_name: String,
    #[serde(with = "serde_millis")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "serde_millis")]
    pub end_time: DateTime<Utc>,
    pub message_count: usize,
    pub tools_used: BTreeSet<String>,
    pub status: SummaryStatus,
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryWriter {
    layout: SessionLayout,
}

impl SummaryWriter {
    pub fn new(layout: SessionLayout) -> Self {
        Self { layout }
    }

    /// Write `<reports>/<S>/<A>-summary.json`, replacing an earlier one.
    pub async fn write_summary(&self, summary: &Summary) -> Result<std::path::PathBuf> {
        validate_session_id(&summary.session_id)?;
        validate_agent_name(&summary.agent_name)?;
        let path = self
            .layout
            .summary_path(&summary.session_id, &summary.agent_name);
        let json = serde_json::to_vec_pretty(summary)?;
        write_atomic(&path, &json)
            .await
            .with_context(|| format!("Failed to write summary for {}", summary.session_id))?;
        info!(
            session_id = %summary.session_id,
            agent = %summary.agent_name,
            status = %summary.status,
            "[Summary] Wrote {}",
            path.display()
        );
        Ok(path)
    }

    /// Every summary under `reports/<S>/`, ordered by agent name.
    pub async fn read_summaries(&self, session_id: &str) -> Result<Vec<Summary>> {
        validate_session_id(session_id)?;
        let dir = self.layout.report_dir(session_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_summary = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SUMMARY_SUFFIX));
            if is_summary {
                paths.push(path);
            }
        }
        paths.sort();

        let mut summaries = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Summary>(&raw) {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(path = %path.display(), error = %e, "[Summary] Skipping unreadable summary"),
            }
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    fn sample(agent: &str, status: SummaryStatus) -> Summary {
        let now = time::now();
        Summary {
            session_id: "S1".into(),
            agent_name: agent.into(),
            start_time: now,
            end_time: now,
            message_count: 2,
            tools_used: ["Read", "Bash", "Read"].iter().map(|s| s.to_string()).collect(),
            status,
            results: serde_json::json!({"result": "done"}),
            errors: vec![],
        }
    }

    #[tokio::test]
    async fn one_file_per_session_agent() {
        let dir = tempfile::tempdir().unwrap();
        let w = SummaryWriter::new(SessionLayout::new(dir.path().join("out"), dir.path().join("reports")));
        w.write_summary(&sample("testing-agent", SummaryStatus::Failed)).await.unwrap();
        w.write_summary(&sample("testing-agent", SummaryStatus::Completed)).await.unwrap();
        w.write_summary(&sample("other", SummaryStatus::Completed)).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("reports/S1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 2);

        let summaries = w.read_summaries("S1").await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].agent_name, "testing-agent");
        assert_eq!(summaries[1].status, SummaryStatus::Completed);
    }

    #[test]
    fn json_shape() {
        let v = serde_json::to_value(sample("a", SummaryStatus::Completed)).unwrap();
        assert_eq!(v["status"], "completed");
        assert_eq!(v["toolsUsed"], serde_json::json!(["Bash", "Read"]));
        assert!(v["startTime"].as_str().unwrap().ends_with('Z'));
        assert_eq!(v["messageCount"], 2);
    }
}

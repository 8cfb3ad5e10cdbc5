//! `session_list` / `session_report`: read-only views over stored sessions.

use anyhow::Result;
use async_trait::async_trait;
use conductor_core::{ConductorError, ToolDefinition, ToolHandler, ToolOutput};
use conductor_session::{SessionStore, SummaryWriter};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::parse_args;

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportArgs {
    session_id: String,
}

pub struct SessionHandler {
    store: SessionStore,
    summaries: SummaryWriter,
}

impl SessionHandler {
    pub fn new(store: SessionStore, summaries: SummaryWriter) -> Self {
        Self { store, summaries }
    }
}

#[async_trait]
impl ToolHandler for SessionHandler {
    fn namespace(&self) -> &str {
        "session"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "session_list",
                "List sessions, newest first.",
                json!({
                    "type": "object",
                    "properties": {"limit": {"type": "integer", "minimum": 1}}
                }),
            ),
            ToolDefinition::new(
                "session_report",
                "Metadata and summaries for one session.",
                json!({
                    "type": "object",
                    "properties": {"sessionId": {"type": "string"}},
                    "required": ["sessionId"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        match tool {
            "session_list" => {
                let ListArgs { limit } = parse_args(tool, args)?;
                let mut sessions = self.store.list_sessions().await?;
                if let Some(limit) = limit {
                    sessions.truncate(limit);
                }
                Ok(ToolOutput::json(&serde_json::to_value(sessions)?))
            }
            "session_report" => {
                let ReportArgs { session_id } = parse_args(tool, args)?;
                let metadata = self.store.load_session(&session_id).await?;
                let summaries = self.summaries.read_summaries(&session_id).await?;
                Ok(ToolOutput::json(&json!({
                    "metadata": metadata,
                    "summaries": summaries,
                })))
            }
            other => Err(ConductorError::UnknownTool(other.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_session::SessionLayout;

    fn handler(dir: &std::path::Path) -> (SessionHandler, SessionStore) {
        let layout = SessionLayout::new(dir.join("output_streams"), dir.join("reports"));
        let store = SessionStore::new(layout.clone());
        (SessionHandler::new(store.clone(), SummaryWriter::new(layout)), store)
    }

    #[tokio::test]
    async fn list_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, store) = handler(dir.path());
        for _ in 0..3 {
            store.create_session("a").await.unwrap();
        }
        let out = handler.call("session_list", Value::Null).await.unwrap();
        assert_eq!(serde_json::from_str::<Vec<Value>>(&out.text).unwrap().len(), 3);

        let out = handler.call("session_list", json!({"limit": 2})).await.unwrap();
        assert_eq!(serde_json::from_str::<Vec<Value>>(&out.text).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn report_includes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, store) = handler(dir.path());
        let session = store.create_session("reviewer").await.unwrap();
        let out = handler
            .call("session_report", json!({"sessionId": session.id}))
            .await
            .unwrap();
        let report: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(report["metadata"]["agentName"], "reviewer");
        assert_eq!(report["summaries"], json!([]));
    }

    #[tokio::test]
    async fn report_for_bad_id_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());
        let err = handler
            .call("session_report", json!({"sessionId": "../etc"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid session id"));
    }
}

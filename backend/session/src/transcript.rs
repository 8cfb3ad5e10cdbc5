//! Transcript appender for `conversation.jsonl`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::warn;

use crate::fsio::append_line;
use crate::layout::{validate_session_id, SessionLayout};
use crate::time::{self, serde_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub role: Role,
    pub content: String,
    #[serde(with = "serde_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ConversationRecord {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: time::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tag the record as part of a resumed conversation.
    pub fn continuation(mut self) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert("invocationType".into(), Value::String("continuation".into()));
        self
    }

    pub fn is_continuation(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("invocationType"))
            .and_then(Value::as_str)
            == Some("continuation")
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptWriter {
    layout: SessionLayout,
}

impl TranscriptWriter {
    pub fn new(layout: SessionLayout) -> Self {
        Self { layout }
    }

    pub async fn append_record(&self, session_id: &str, record: &ConversationRecord) -> Result<()> {
        validate_session_id(session_id)?;
        let line = serde_json::to_string(record)?;
        append_line(&self.layout.transcript_path(session_id), &line).await
    }

    /// All parseable records in order. A missing transcript is empty;
    /// a corrupt line is skipped.
    pub async fn read_records(&self, session_id: &str) -> Result<Vec<ConversationRecord>> {
        validate_session_id(session_id)?;
        let path = self.layout.transcript_path(session_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ConversationRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    session_id = %session_id,
                    line = idx + 1,
                    error = %e,
                    "[Transcript] Skipping unparseable record"
                ),
            }
        }
        Ok(records)
    }
}

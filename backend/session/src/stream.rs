//! Streaming Writer: the human-readable `session.log`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::fs;
use tracing::debug;

use conductor_core::ConductorError;

use crate::fsio::{append_line, create_new};
use crate::layout::{validate_session_id, SessionLayout};
use crate::time;

pub const HEADER_MARKER: &str = "=== Agent Session Started ===";

/// Line level; decides the tag written after the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamLevel {
    #[default]
    Info,
    Debug,
    Tool,
}

impl StreamLevel {
    pub fn tag(self) -> Option<&'static str> {
        match self {
            StreamLevel::Info => None,
            StreamLevel::Debug => Some("[DEBUG]"),
            StreamLevel::Tool => Some("[TOOL]"),
        }
    }
}

impl fmt::Display for StreamLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamLevel::Info => "info",
            StreamLevel::Debug => "debug",
            StreamLevel::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// `[<ts>] <tag?> <text>`
pub fn format_line(ts: &DateTime<Utc>, level: StreamLevel, message: &str) -> String {
    match level.tag() {
        Some(tag) => format!("[{}] {} {}", time::iso_millis(ts), tag, message),
        None => format!("[{}] {}", time::iso_millis(ts), message),
    }
}

fn header(session_id: &str, agent_name: &str, started: &DateTime<Utc>) -> String {
    format!(
        "{HEADER_MARKER}\nSession ID: {session_id}\nAgent: {agent_name}\nStarted: {}\n\n",
        time::iso_millis(started)
    )
}

#[derive(Debug, Clone)]
pub struct StreamWriter {
    layout: SessionLayout,
}

impl StreamWriter {
    pub fn new(layout: SessionLayout) -> Self {
        Self { layout }
    }

    /// Create `session.log` with its header. Calling it again for the same
    /// session leaves the file untouched.
    pub async fn init_stream_file(&self, session_id: &str, agent_name: &str) -> Result<()> {
        validate_session_id(session_id)?;
        let dir = self.layout.stream_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = self.layout.log_path(session_id);
        let created = create_new(&path, &header(session_id, agent_name, &time::now())).await?;
        if created {
            debug!(session_id = %session_id, "[Stream] Initialized session log");
        }
        Ok(())
    }

    /// Append one raw line.
    pub async fn append_to_stream(&self, session_id: &str, line: &str) -> Result<()> {
        validate_session_id(session_id)?;
        append_line(&self.layout.log_path(session_id), line).await
    }

    /// Timestamp, tag and append `message`.
    pub async fn add_streaming_output(
        &self,
        session_id: &str,
        message: &str,
        level: StreamLevel,
    ) -> Result<()> {
        let line = format_line(&time::now(), level, message);
        self.append_to_stream(session_id, &line).await
    }

    /// The whole log as text.
    pub async fn read_log(&self, session_id: &str) -> Result<String, ConductorError> {
        validate_session_id(session_id)?;
        match fs::read_to_string(self.layout.log_path(session_id)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConductorError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

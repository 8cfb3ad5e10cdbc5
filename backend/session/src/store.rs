//! Session Store: ids, directories, metadata, and per-session leases.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info, warn};

use conductor_core::ConductorError;

use crate::fsio::write_atomic;
use crate::layout::{validate_agent_name, validate_session_id, SessionLayout};
use crate::time::{self, serde_millis};

/// Persisted in `session-metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub agent_name: String,
    #[serde(with = "serde_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "serde_millis")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub invocation_count: u32,
    /// The query runner's own conversation id, used to resume it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_session_id: Option<String>,
}

/// A handle on an existing session and its directories.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub stream_dir: PathBuf,
    pub report_dir: PathBuf,
}

/// Held while an invocation runs against a session; dropping it frees the
/// session for the next invocation.
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.session_id);
        debug!(session_id = %self.session_id, "Released session lease");
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    layout: SessionLayout,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionStore {
    pub fn new(layout: SessionLayout) -> Self {
        Self {
            layout,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    /// `<YYYYMMDD-HHMMSS>-<uuid>`: sortable by creation and collision-resistant.
    pub fn generate_id() -> String {
        format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            uuid::Uuid::new_v4().simple()
        )
    }

    /// Create a fresh session for `agent_name` with its stream and report
    /// directories and initial metadata.
    pub async fn create_session(&self, agent_name: &str) -> Result<Session> {
        validate_agent_name(agent_name)?;

        let id = loop {
            let candidate = Self::generate_id();
            if !fs::try_exists(self.layout.stream_dir(&candidate)).await.unwrap_or(false) {
                break candidate;
            }
        };

        let stream_dir = self.layout.stream_dir(&id);
        let report_dir = self.layout.report_dir(&id);
        fs::create_dir_all(&stream_dir)
            .await
            .with_context(|| format!("Failed to create {}", stream_dir.display()))?;
        fs::create_dir_all(&report_dir)
            .await
            .with_context(|| format!("Failed to create {}", report_dir.display()))?;

        let created_at = time::now();
        let metadata = SessionMetadata {
            session_id: id.clone(),
            agent_name: agent_name.to_string(),
            created_at,
            last_updated: created_at,
            invocation_count: 0,
            external_session_id: None,
        };
        self.write_metadata(&metadata).await?;

        info!(session_id = %id, agent = %agent_name, "[SessionStore] Created session");
        Ok(Session {
            id,
            agent_name: agent_name.to_string(),
            created_at,
            stream_dir,
            report_dir,
        })
    }

    /// Read a session's metadata; unknown ids are `SessionNotFound`.
    pub async fn load_session(&self, session_id: &str) -> Result<SessionMetadata, ConductorError> {
        validate_session_id(session_id)?;
        let path = self.layout.metadata_path(session_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConductorError::SessionNotFound(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata: SessionMetadata = serde_json::from_str(&raw)?;
        Ok(metadata)
    }

    /// A [`Session`] handle for an existing id.
    pub async fn open_session(&self, session_id: &str) -> Result<Session, ConductorError> {
        let metadata = self.load_session(session_id).await?;
        Ok(self.handle(&metadata))
    }

    pub fn handle(&self, metadata: &SessionMetadata) -> Session {
        Session {
            id: metadata.session_id.clone(),
            agent_name: metadata.agent_name.clone(),
            created_at: metadata.created_at,
            stream_dir: self.layout.stream_dir(&metadata.session_id),
            report_dir: self.layout.report_dir(&metadata.session_id),
        }
    }

    /// Read-modify-write the metadata, bumping `lastUpdated`.
    pub async fn update_metadata<F>(&self, session_id: &str, update: F) -> Result<SessionMetadata>
    where
        F: FnOnce(&mut SessionMetadata),
    {
        let mut metadata = self.load_session(session_id).await?;
        update(&mut metadata);
        metadata.last_updated = time::now().max(metadata.last_updated);
        self.write_metadata(&metadata).await?;
        Ok(metadata)
    }

    /// Bump `lastUpdated` and add `invocations_delta` to the counter.
    pub async fn touch(&self, session_id: &str, invocations_delta: u32) -> Result<SessionMetadata> {
        self.update_metadata(session_id, |m| {
            m.invocation_count = m.invocation_count.saturating_add(invocations_delta);
        })
        .await
    }

    async fn write_metadata(&self, metadata: &SessionMetadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&self.layout.metadata_path(&metadata.session_id), &json).await
    }

    /// Every session with readable metadata, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let dir = self.layout.output_dir();
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if validate_session_id(&name).is_err() || !entry.path().is_dir() {
                continue;
            }
            match self.load_session(&name).await {
                Ok(metadata) => sessions.push(metadata),
                Err(ConductorError::SessionNotFound(_)) => {
                    debug!(dir = %name, "Skipping directory without metadata");
                }
                Err(e) => warn!(session_id = %name, error = %e, "Skipping unreadable session"),
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.session_id.cmp(&a.session_id)));
        Ok(sessions)
    }

    /// Claim a session for one invocation. A second concurrent claim on the
    /// same id is refused with `SessionBusy`.
    pub fn acquire(&self, session_id: &str) -> Result<SessionLease, ConductorError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(session_id.to_string()) {
            warn!(session_id = %session_id, "[SessionStore] Session already has an invocation in flight");
            return Err(ConductorError::SessionBusy(session_id.to_string()));
        }
        Ok(SessionLease {
            session_id: session_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(session_id)
    }
}

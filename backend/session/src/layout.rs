use std::path::{Path, PathBuf};

use conductor_core::ConductorError;

pub const LOG_FILE: &str = "session.log";
pub const TRANSCRIPT_FILE: &str = "conversation.jsonl";
pub const METADATA_FILE: &str = "session-metadata.json";
pub const SUMMARY_SUFFIX: &str = "-summary.json";

/// Session ids are used as directory names, so only `[A-Za-z0-9_-]` is
/// accepted from the outside world.
pub fn validate_session_id(id: &str) -> Result<(), ConductorError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ConductorError::InvalidSessionId(id.to_string()))
    }
}

/// Agent names end up in summary file names.
pub fn validate_agent_name(name: &str) -> Result<(), ConductorError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ConductorError::ConfigError(format!("invalid agent name: {name:?}")))
    }
}

/// Where everything for a session lives.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    output_dir: PathBuf,
    reports_dir: PathBuf,
}

impl SessionLayout {
    pub fn new(output_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn stream_dir(&self, session_id: &str) -> PathBuf {
        self.output_dir.join(session_id)
    }

    pub fn report_dir(&self, session_id: &str) -> PathBuf {
        self.reports_dir.join(session_id)
    }

    pub fn log_path(&self, session_id: &str) -> PathBuf {
        self.stream_dir(session_id).join(LOG_FILE)
    }

    pub fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.stream_dir(session_id).join(TRANSCRIPT_FILE)
    }

    pub fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.stream_dir(session_id).join(METADATA_FILE)
    }

    pub fn summary_path(&self, session_id: &str, agent_name: &str) -> PathBuf {
        self.report_dir(session_id)
            .join(format!("{agent_name}{SUMMARY_SUFFIX}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout() {
        let layout = SessionLayout::new("/w/output_streams", "/w/reports");
        assert_eq!(
            layout.log_path("S1"),
            PathBuf::from("/w/output_streams/S1/session.log")
        );
        assert_eq!(
            layout.transcript_path("S1"),
            PathBuf::from("/w/output_streams/S1/conversation.jsonl")
        );
        assert_eq!(
            layout.metadata_path("S1"),
            PathBuf::from("/w/output_streams/S1/session-metadata.json")
        );
        assert_eq!(
            layout.summary_path("S1", "testing-agent"),
            PathBuf::from("/w/reports/S1/testing-agent-summary.json")
        );
    }

    #[test]
    fn session_id_charset() {
        assert!(validate_session_id("20261019-081530-3f2a").is_ok());
        assert!(validate_session_id("a_b").is_ok());
        for bad in ["", "../etc", "a/b", "a b", "x.y"] {
            assert!(validate_session_id(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn agent_name_charset() {
        assert!(validate_agent_name("testing-agent").is_ok());
        assert!(validate_agent_name("v2.agent").is_ok());
        assert!(validate_agent_name("../x").is_err());
        assert!(validate_agent_name(".hidden").is_err());
    }
}

use thiserror::Error;

/// Top-level error type for the Conductor runtime.
///
/// Callers branch on these variants (HTTP status mapping, CLI exit codes,
/// tool error responses); everything else travels as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} is busy")]
    SessionBusy(String),

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("Invocation timed out after {0}s")]
    Timeout(u64),

    #[error("query runner error: {0}")]
    RunnerError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConductorError {
    /// Usage errors are reported to the caller as-is and never retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ConductorError::SessionNotFound(_)
                | ConductorError::SessionBusy(_)
                | ConductorError::InvalidSessionId(_)
                | ConductorError::AgentNotFound(_)
                | ConductorError::UnknownTool(_)
                | ConductorError::InvalidPath(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_contains_id() {
        let err = ConductorError::SessionNotFound("20261019-abc".into());
        let msg = err.to_string();
        assert!(msg.contains("20261019-abc"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_usage_error_classification() {
        assert!(ConductorError::UnknownTool("x".into()).is_usage_error());
        assert!(!ConductorError::Timeout(30).is_usage_error());
        assert!(!ConductorError::RunnerError("exit 1".into()).is_usage_error());
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ConductorError::SessionBusy("s1".into()).into();
        assert!(matches!(
            err.downcast_ref::<ConductorError>(),
            Some(ConductorError::SessionBusy(id)) if id == "s1"
        ));
    }
}

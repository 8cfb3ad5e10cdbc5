//! Agent Event Logger
//!
//! Session lifecycle events (invocation start/finish, tool calls, messages,
//! errors) emitted under the `agent_events` target, redacted first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    InvocationStarted {
        agent: String,
        continuation: bool,
    },
    ToolCall {
        tool_name: String,
        arguments_json: String,
    },
    Message {
        role: String,
        content: String,
    },
    Error {
        error_msg: String,
    },
    InvocationFinished {
        status: String,
        message_count: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct SessionEventEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: SessionEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Redact and emit one event for `session_id`.
    pub fn log_event(session_id: &str, mut event: SessionEvent) {
        match &mut event {
            SessionEvent::ToolCall { arguments_json, .. } => {
                *arguments_json = redact_sensitive_data(arguments_json);
            }
            SessionEvent::Message { content, .. } => {
                *content = redact_sensitive_data(content);
            }
            SessionEvent::Error { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            SessionEvent::InvocationStarted { .. } | SessionEvent::InvocationFinished { .. } => {}
        }

        let is_error = matches!(event, SessionEvent::Error { .. });
        let entry = SessionEventEntry {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event,
        };
        let json = serde_json::to_string(&entry).unwrap_or_default();

        if is_error {
            warn!(target: "agent_events", session_id = %entry.session_id, event = %json, "Agent session event");
        } else {
            info!(target: "agent_events", session_id = %entry.session_id, event = %json, "Agent session event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let entry = SessionEventEntry {
            session_id: "s1".into(),
            timestamp: Utc::now(),
            event: SessionEvent::InvocationFinished {
                status: "completed".into(),
                message_count: 3,
            },
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["event"]["type"], "invocation_finished");
        assert_eq!(v["event"]["message_count"], 3);
    }

    #[test]
    fn test_log_event_without_subscriber_does_not_panic() {
        EventLogger::log_event(
            "s1",
            SessionEvent::ToolCall {
                tool_name: "file_write".into(),
                arguments_json: "{\"token\":\"Bearer abc.def\"}".into(),
            },
        );
    }
}

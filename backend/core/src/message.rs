use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message produced by an external query run, normalized from
/// whatever wire format the runner speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Runtime bookkeeping (init, hooks). Carries the runner's own
    /// conversation id when it reports one.
    System {
        subtype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_session_id: Option<String>,
    },
    /// A plain text chunk.
    Text { text: String },
    /// A complete assistant turn (text content only).
    Assistant { text: String },
    /// The model asked for a tool.
    ToolCall {
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// A tool's result was fed back to the model.
    ToolResult {
        #[serde(default)]
        is_error: bool,
    },
    /// Terminal: the run finished.
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_turns: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_session_id: Option<String>,
    },
    /// Terminal: the run failed.
    Error { message: String },
}

impl AgentMessage {
    pub fn text(text: impl Into<String>) -> Self {
        AgentMessage::Text { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        AgentMessage::Assistant { text: text.into() }
    }

    pub fn tool_call(name: impl Into<String>, input: Value) -> Self {
        AgentMessage::ToolCall { name: name.into(), input }
    }

    pub fn error(message: impl Into<String>) -> Self {
        AgentMessage::Error { message: message.into() }
    }

    /// A successful result with the given final text.
    pub fn result(text: impl Into<String>) -> Self {
        AgentMessage::Result {
            result: Some(text.into()),
            is_error: false,
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
            external_session_id: None,
        }
    }

    /// `Result` and `Error` end the running state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentMessage::Result { .. } | AgentMessage::Error { .. })
    }

    /// Conversational content that belongs in the transcript.
    pub fn content_text(&self) -> Option<&str> {
        match self {
            AgentMessage::Text { text } | AgentMessage::Assistant { text } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_kinds() {
        assert!(AgentMessage::result("done").is_terminal());
        assert!(AgentMessage::error("boom").is_terminal());
        assert!(!AgentMessage::assistant("hi").is_terminal());
        assert!(!AgentMessage::tool_call("file_write", json!({})).is_terminal());
    }

    #[test]
    fn test_content_text_only_for_chunks() {
        assert_eq!(AgentMessage::text("a").content_text(), Some("a"));
        assert_eq!(AgentMessage::assistant("b").content_text(), Some("b"));
        assert_eq!(AgentMessage::result("c").content_text(), None);
    }

    #[test]
    fn test_kind_tag_serialization() {
        let v = serde_json::to_value(AgentMessage::tool_call("build_run", json!({"x": 1}))).unwrap();
        assert_eq!(v["kind"], "tool_call");
        assert_eq!(v["name"], "build_run");

        let parsed: AgentMessage =
            serde_json::from_value(json!({"kind": "error", "message": "bad"})).unwrap();
        assert_eq!(parsed, AgentMessage::error("bad"));
    }
}

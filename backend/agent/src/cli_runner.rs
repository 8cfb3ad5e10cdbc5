/// External CLI query runner: drives the agent CLI in `stream-json` mode and
/// normalizes its output into [`AgentMessage`]s.
use std::collections::VecDeque;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use conductor_core::{AgentMessage, MessageStream, QueryRequest, QueryRunner};
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CliQueryRunner {
    command: String,
    env: Vec<(String, String)>,
}

impl CliQueryRunner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: Vec::new(),
        }
    }

    /// Extra variables set on every child on top of the inherited environment.
    pub fn with_env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Argument list for one request, prompt first.
    pub fn build_args(request: &QueryRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(prompt) = &request.system_prompt {
            args.push("--append-system-prompt".into());
            args.push(prompt.clone());
        }
        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".into());
            args.push(request.allowed_tools.join(","));
        }
        if let Some(model) = &request.model {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(turns) = request.max_turns {
            args.push("--max-turns".into());
            args.push(turns.to_string());
        }
        if let Some(resume) = &request.resume {
            args.push("--resume".into());
            args.push(resume.clone());
        }
        if let Some(mcp) = &request.mcp_config {
            args.push("--mcp-config".into());
            args.push(mcp.to_string());
        }
        args
    }
}

#[async_trait]
impl QueryRunner for CliQueryRunner {
    fn name(&self) -> &str {
        "cli"
    }

    async fn query(&self, request: QueryRequest) -> Result<MessageStream> {
        let args = Self::build_args(&request);
        info!(
            "[CliRunner] Spawning {} for agent {} ({} args)",
            self.command,
            request.agent_name,
            args.len()
        );

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.command))?;
        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let mut stderr = stderr;
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let run = CliRun {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr: Some(stderr_task),
            pending: VecDeque::new(),
            saw_result: false,
            finished: false,
        };
        Ok(futures::stream::unfold(run, CliRun::next).boxed())
    }
}

/// State of one child process. Dropping it kills the child.
struct CliRun {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    pending: VecDeque<AgentMessage>,
    saw_result: bool,
    finished: bool,
}

impl CliRun {
    async fn next(mut self) -> Option<(Result<AgentMessage>, Self)> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                if matches!(msg, AgentMessage::Result { .. }) {
                    self.saw_result = true;
                }
                return Some((Ok(msg), self));
            }
            if self.finished {
                return None;
            }

            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_stream_line(&line) {
                        Some(messages) => self.pending.extend(messages),
                        None => warn!("[CliRunner] Skipping unparseable output line"),
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    if let Some(msg) = self.exit_message().await {
                        return Some((Ok(msg), self));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some((Err(anyhow::Error::new(e).context("Failed to read runner output")), self));
                }
            }
        }
    }

    /// An `Error` message when the child failed without reporting a result.
    async fn exit_message(&mut self) -> Option<AgentMessage> {
        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => return Some(AgentMessage::error(format!("Failed to wait for runner: {e}"))),
        };
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        debug!("[CliRunner] Child exited with {status}");

        if status.success() || self.saw_result {
            return None;
        }
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let detail = stderr.trim();
        Some(AgentMessage::error(if detail.is_empty() {
            format!("Runner exited with status {code}")
        } else {
            format!("Runner exited with status {code}: {detail}")
        }))
    }
}

// ---------------------------------------------------------------------------
// stream-json parsing
// ---------------------------------------------------------------------------

/// Normalize one `stream-json` line. `None` when the line is not JSON or has
/// no `type`; unknown types normalize to nothing.
pub fn parse_stream_line(line: &str) -> Option<Vec<AgentMessage>> {
    let value: Value = serde_json::from_str(line).ok()?;
    let kind = value.get("type")?.as_str()?;
    let session_id = value
        .get("session_id")
        .and_then(Value::as_str)
        .map(String::from);

    let messages = match kind {
        "system" => vec![AgentMessage::System {
            subtype: value
                .get("subtype")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            external_session_id: session_id,
        }],
        "assistant" => content_blocks(&value)
            .iter()
            .filter_map(|block| match block.get("type").and_then(Value::as_str) {
                Some("text") => block
                    .get("text")
                    .and_then(Value::as_str)
                    .map(AgentMessage::assistant),
                Some("tool_use") => block.get("name").and_then(Value::as_str).map(|name| {
                    AgentMessage::tool_call(name, block.get("input").cloned().unwrap_or(Value::Null))
                }),
                _ => None,
            })
            .collect(),
        "user" => content_blocks(&value)
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
            .map(|block| AgentMessage::ToolResult {
                is_error: block.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect(),
        "result" => vec![AgentMessage::Result {
            result: value.get("result").and_then(Value::as_str).map(String::from),
            is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            cost_usd: value
                .get("total_cost_usd")
                .or_else(|| value.get("cost_usd"))
                .and_then(Value::as_f64),
            duration_ms: value.get("duration_ms").and_then(Value::as_u64),
            num_turns: value
                .get("num_turns")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            external_session_id: session_id,
        }],
        "error" => vec![AgentMessage::error(
            value
                .get("error")
                .or_else(|| value.get("message"))
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| "unknown runner error".to_string()),
        )],
        other => {
            debug!("[CliRunner] Ignoring message type {other}");
            Vec::new()
        }
    };
    Some(messages)
}

fn content_blocks(value: &Value) -> &[Value] {
    value
        .pointer("/message/content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_flags_from_request() {
        let request = QueryRequest {
            prompt: "do it".into(),
            agent_name: "a".into(),
            system_prompt: Some("be brief".into()),
            allowed_tools: vec!["Read".into(), "Bash".into()],
            model: Some("sonnet".into()),
            max_turns: Some(4),
            resume: Some("ext-1".into()),
            mcp_config: Some(json!({"mcpServers": {}})),
            cwd: None,
        };
        let args = CliQueryRunner::build_args(&request);
        assert_eq!(&args[..5], &["-p", "do it", "--output-format", "stream-json", "--verbose"]);
        let joined = args.join(" ");
        assert!(joined.contains("--allowedTools Read,Bash"));
        assert!(joined.contains("--max-turns 4"));
        assert!(joined.contains("--resume ext-1"));
        assert!(joined.contains(r#"--mcp-config {"mcpServers":{}}"#));
    }

    #[test]
    fn parses_assistant_blocks() {
        let line = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "Looking"},
                {"type": "tool_use", "id": "t1", "name": "Read", "input": {"path": "x"}}
            ]}
        })
        .to_string();
        let messages = parse_stream_line(&line).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], AgentMessage::assistant("Looking"));
        assert_eq!(messages[1], AgentMessage::tool_call("Read", json!({"path": "x"})));
    }

    #[test]
    fn parses_result_and_system() {
        let result = json!({
            "type": "result", "subtype": "success", "is_error": false,
            "result": "done", "total_cost_usd": 0.5, "duration_ms": 1200,
            "num_turns": 3, "session_id": "ext-9"
        })
        .to_string();
        match &parse_stream_line(&result).unwrap()[0] {
            AgentMessage::Result { result, cost_usd, num_turns, external_session_id, .. } => {
                assert_eq!(result.as_deref(), Some("done"));
                assert_eq!(*cost_usd, Some(0.5));
                assert_eq!(*num_turns, Some(3));
                assert_eq!(external_session_id.as_deref(), Some("ext-9"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let system = json!({"type": "system", "subtype": "init", "session_id": "ext-9"}).to_string();
        assert_eq!(
            parse_stream_line(&system).unwrap(),
            vec![AgentMessage::System { subtype: "init".into(), external_session_id: Some("ext-9".into()) }]
        );
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_stream_line("not json").is_none());
        assert!(parse_stream_line("{\"no_type\": 1}").is_none());
        assert!(parse_stream_line("{\"type\": \"stream_event\"}").unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_child_becomes_error_message() {
        // `sh -p <script> ...` runs the script with the remaining flags as arguments.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-cli.sh");
        std::fs::write(
            &script,
            "echo '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}'\n\
             echo 'not json'\n\
             echo boom >&2\n\
             exit 3\n",
        )
        .unwrap();

        let runner = CliQueryRunner::new("sh");
        let request = QueryRequest {
            prompt: script.display().to_string(),
            ..Default::default()
        };
        let messages: Vec<_> = runner.query(request).await.unwrap().collect().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].as_ref().unwrap(), &AgentMessage::assistant("hi"));
        match messages[1].as_ref().unwrap() {
            AgentMessage::Error { message } => {
                assert!(message.contains("status 3"), "{message}");
                assert!(message.contains("boom"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_fails_to_start() {
        let runner = CliQueryRunner::new("/nonexistent/conductor-runner");
        assert!(runner.query(QueryRequest::default()).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_sees_extra_env() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-cli.sh");
        std::fs::write(
            &script,
            "echo \"{\\\"type\\\":\\\"result\\\",\\\"result\\\":\\\"$CONDUCTOR_TEST_TOKEN\\\"}\"\n",
        )
        .unwrap();

        let runner = CliQueryRunner::new("sh").with_env([("CONDUCTOR_TEST_TOKEN", "from-dotenv")]);
        let request = QueryRequest {
            prompt: script.display().to_string(),
            ..Default::default()
        };
        let messages: Vec<_> = runner.query(request).await.unwrap().collect().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_ref().unwrap(), &AgentMessage::result("from-dotenv"));
    }
}

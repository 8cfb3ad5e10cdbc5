//! Agent Invoker.
//!
//! One invocation moves `Idle -> Running -> {Completed, Failed}`; `Error` is
//! reserved for our own bookkeeping failures. Whatever happens while running,
//! the summary is written last.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use conductor_config::{AgentCatalog, AgentProfile, IntegrationRegistry, LoadedEnv, Settings};
use conductor_core::{AgentMessage, ConductorError, QueryRequest, QueryRunner};
use conductor_logging::{EventLogger, SessionEvent};
use conductor_session::{
    ConversationRecord, Session, SessionLayout, SessionLease, SessionStore, StreamLevel,
    StreamWriter, Summary, SummaryStatus, SummaryWriter, TranscriptWriter, time,
    validate_agent_name,
};
use futures::StreamExt;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Running,
    Completed,
    Failed,
    Error,
}

impl From<SummaryStatus> for InvocationState {
    fn from(status: SummaryStatus) -> Self {
        match status {
            SummaryStatus::Completed => InvocationState::Completed,
            SummaryStatus::Failed => InvocationState::Failed,
            SummaryStatus::Error => InvocationState::Error,
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationState::Idle => "idle",
            InvocationState::Running => "running",
            InvocationState::Completed => "completed",
            InvocationState::Failed => "failed",
            InvocationState::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Required for a new session; overrides the stored agent when continuing.
    pub agent_name: Option<String>,
    pub timeout: Option<Duration>,
    pub stream_to_file: bool,
    pub continue_session_id: Option<String>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            agent_name: None,
            timeout: None,
            stream_to_file: true,
            continue_session_id: None,
        }
    }
}

impl InvokeOptions {
    pub fn for_agent(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: Some(agent_name.into()),
            ..Self::default()
        }
    }

    pub fn continuing(session_id: impl Into<String>) -> Self {
        Self {
            continue_session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub session_id: String,
    pub agent_name: String,
    pub status: SummaryStatus,
    pub summary: Summary,
    pub summary_path: PathBuf,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Drives query runs and owns the session bookkeeping around them.
#[derive(Clone)]
pub struct AgentInvoker {
    store: SessionStore,
    stream: StreamWriter,
    transcript: TranscriptWriter,
    summaries: SummaryWriter,
    runner: Arc<dyn QueryRunner>,
    agents: Arc<AgentCatalog>,
    integrations: Arc<IntegrationRegistry>,
    env: Arc<LoadedEnv>,
    cwd: Option<PathBuf>,
    default_timeout: Option<Duration>,
}

impl AgentInvoker {
    pub fn new(layout: SessionLayout, runner: Arc<dyn QueryRunner>) -> Self {
        Self {
            store: SessionStore::new(layout.clone()),
            stream: StreamWriter::new(layout.clone()),
            transcript: TranscriptWriter::new(layout.clone()),
            summaries: SummaryWriter::new(layout),
            runner,
            agents: Arc::new(AgentCatalog::default()),
            integrations: Arc::new(IntegrationRegistry::default()),
            env: Arc::new(LoadedEnv::default()),
            cwd: None,
            default_timeout: None,
        }
    }

    pub fn from_settings(settings: &Settings, runner: Arc<dyn QueryRunner>) -> Self {
        let config = &settings.config;
        let layout = SessionLayout::new(&config.output_dir, &config.reports_dir);
        let mut invoker = Self::new(layout, runner)
            .with_agents(Arc::clone(&settings.agents))
            .with_integrations(Arc::clone(&settings.integrations))
            .with_env(Arc::clone(&settings.env))
            .with_cwd(config.root.clone());
        invoker.default_timeout = config.default_timeout_secs.map(Duration::from_secs);
        invoker
    }

    pub fn with_agents(mut self, agents: Arc<AgentCatalog>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_integrations(mut self, integrations: Arc<IntegrationRegistry>) -> Self {
        self.integrations = integrations;
        self
    }

    pub fn with_env(mut self, env: Arc<LoadedEnv>) -> Self {
        self.env = env;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn stream(&self) -> &StreamWriter {
        &self.stream
    }

    pub fn transcript(&self) -> &TranscriptWriter {
        &self.transcript
    }

    pub fn summaries(&self) -> &SummaryWriter {
        &self.summaries
    }

    /// Prepare an invocation: create or load the session and take its lease.
    ///
    /// An unknown continuation id fails here, before anything is written.
    pub async fn start(
        &self,
        prompt: impl Into<String>,
        options: InvokeOptions,
    ) -> Result<Invocation, ConductorError> {
        let prompt = prompt.into();

        let (session, lease, continuation, external_session_id) =
            match &options.continue_session_id {
                Some(session_id) => {
                    let metadata = self.store.load_session(session_id).await?;
                    let lease = self.store.acquire(session_id)?;
                    let history = self.transcript.read_records(session_id).await?;
                    debug!(
                        session_id = %session_id,
                        records = history.len(),
                        "[Invoker] Loaded transcript for continuation"
                    );

                    let mut session = self.store.handle(&metadata);
                    if let Some(agent) = &options.agent_name {
                        validate_agent_name(agent)?;
                        session.agent_name = agent.clone();
                    }
                    (session, lease, true, metadata.external_session_id)
                }
                None => {
                    let agent = options.agent_name.as_deref().ok_or_else(|| {
                        ConductorError::ConfigError(
                            "an agent name is required to start a session".to_string(),
                        )
                    })?;
                    validate_agent_name(agent)?;
                    let session = self.store.create_session(agent).await?;
                    let lease = self.store.acquire(&session.id)?;
                    (session, lease, false, None)
                }
            };

        let profile = match self.agents.get(&session.agent_name) {
            Some(profile) => profile.clone(),
            None => {
                warn!(agent = %session.agent_name, "[Invoker] No definition found, running with defaults");
                AgentProfile::bare(&session.agent_name)
            }
        };

        info!(
            session_id = %session.id,
            agent = %session.agent_name,
            continuation,
            "[Invoker] Invocation prepared"
        );

        Ok(Invocation {
            invoker: self.clone(),
            session,
            profile,
            prompt,
            continuation,
            external_session_id,
            timeout: options.timeout.or(self.default_timeout),
            stream_to_file: options.stream_to_file,
            state: InvocationState::Idle,
            _lease: lease,
        })
    }

    pub async fn invoke_agent(
        &self,
        prompt: impl Into<String>,
        options: InvokeOptions,
    ) -> Result<InvocationOutcome> {
        let invocation = self.start(prompt, options).await?;
        invocation.run().await
    }

    /// Resume `session_id` with its stored agent.
    pub async fn continue_conversation(
        &self,
        session_id: &str,
        prompt: impl Into<String>,
    ) -> Result<InvocationOutcome> {
        self.invoke_agent(prompt, InvokeOptions::continuing(session_id))
            .await
    }
}

/// What one run observed.
#[derive(Debug, Default)]
struct RunTracker {
    message_count: usize,
    tools_used: BTreeSet<String>,
    results: Map<String, Value>,
    errors: Vec<String>,
    status: Option<SummaryStatus>,
    external_session_id: Option<String>,
}

impl RunTracker {
    fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = Some(SummaryStatus::Failed);
    }
}

/// A prepared invocation holding its session lease.
pub struct Invocation {
    invoker: AgentInvoker,
    session: Session,
    profile: AgentProfile,
    prompt: String,
    continuation: bool,
    external_session_id: Option<String>,
    timeout: Option<Duration>,
    stream_to_file: bool,
    state: InvocationState,
    _lease: SessionLease,
}

impl Invocation {
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn agent_name(&self) -> &str {
        &self.session.agent_name
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn is_continuation(&self) -> bool {
        self.continuation
    }

    /// Run to a terminal state and write the summary. The lease is released
    /// when this returns.
    pub async fn run(mut self) -> Result<InvocationOutcome> {
        let start_time = time::now();
        let session_id = self.session.id.clone();
        let agent_name = self.session.agent_name.clone();
        self.state = InvocationState::Running;

        info!(
            session_id = %session_id,
            agent = %agent_name,
            runner = self.invoker.runner.name(),
            "[Invoker] Running"
        );
        EventLogger::log_event(
            &session_id,
            SessionEvent::InvocationStarted {
                agent: agent_name.clone(),
                continuation: self.continuation,
            },
        );

        let mut tracker = RunTracker::default();
        let driven = match self.timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, self.drive(&mut tracker)).await;
                match timed {
                    Ok(result) => result,
                    Err(_) => {
                        let message = ConductorError::Timeout(limit.as_secs()).to_string();
                        warn!(session_id = %session_id, "[Invoker] {message}");
                        self.note_error(&message).await;
                        tracker.fail(message);
                        Ok(())
                    }
                }
            }
            None => self.drive(&mut tracker).await,
        };

        let status = match driven {
            Ok(()) => tracker.status.unwrap_or(SummaryStatus::Completed),
            Err(e) => {
                error!(session_id = %session_id, error = %format!("{e:#}"), "[Invoker] Bookkeeping failed");
                tracker.errors.push(format!("{e:#}"));
                SummaryStatus::Error
            }
        };
        self.state = InvocationState::from(status);

        if let Some(external) = tracker.external_session_id.take() {
            if self.external_session_id.as_deref() != Some(external.as_str()) {
                let stored = self
                    .invoker
                    .store
                    .update_metadata(&session_id, |m| m.external_session_id = Some(external))
                    .await;
                if let Err(e) = stored {
                    warn!(session_id = %session_id, error = %e, "[Invoker] Failed to record external session id");
                }
            }
        }

        if self.stream_to_file {
            let line = format!("Invocation {status}");
            if let Err(e) = self.stream_line(&line, StreamLevel::Info).await {
                warn!(session_id = %session_id, error = %e, "[Invoker] Failed to close stream log");
            }
        }

        let summary = Summary {
            session_id: session_id.clone(),
            agent_name: agent_name.clone(),
            start_time,
            end_time: time::now(),
            message_count: tracker.message_count,
            tools_used: tracker.tools_used,
            status,
            results: Value::Object(tracker.results),
            errors: tracker.errors,
        };
        let summary_path = self.invoker.summaries.write_summary(&summary).await?;

        EventLogger::log_event(
            &session_id,
            SessionEvent::InvocationFinished {
                status: status.to_string(),
                message_count: summary.message_count,
            },
        );
        info!(session_id = %session_id, status = %self.state, "[Invoker] Finished");

        Ok(InvocationOutcome {
            session_id,
            agent_name,
            status,
            summary,
            summary_path,
        })
    }

    async fn drive(&self, tracker: &mut RunTracker) -> Result<()> {
        let id = &self.session.id;
        let invoker = &self.invoker;

        if self.stream_to_file {
            invoker
                .stream
                .init_stream_file(id, &self.session.agent_name)
                .await?;
            if self.continuation {
                self.stream_line("Continuing conversation", StreamLevel::Info)
                    .await?;
            }
            self.stream_line(&format!("USER PROMPT: {}", self.prompt), StreamLevel::Info)
                .await?;
        }
        invoker
            .transcript
            .append_record(id, &self.record(ConversationRecord::user(self.prompt.clone())))
            .await?;
        invoker.store.touch(id, 1).await?;

        let mut messages = match invoker.runner.query(self.query_request()).await {
            Ok(messages) => messages,
            Err(e) => {
                let message = format!("Failed to start query: {e:#}");
                self.note_error(&message).await;
                tracker.fail(message);
                return Ok(());
            }
        };

        while let Some(item) = messages.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    let message = format!("Query stream failed: {e:#}");
                    self.note_error(&message).await;
                    tracker.fail(message);
                    break;
                }
            };
            let terminal = message.is_terminal();
            self.handle(message, tracker).await?;
            if terminal {
                break;
            }
        }
        Ok(())
    }

    async fn handle(&self, message: AgentMessage, tracker: &mut RunTracker) -> Result<()> {
        let id = &self.session.id;
        tracker.message_count += 1;

        match message {
            AgentMessage::System {
                subtype,
                external_session_id,
            } => {
                if external_session_id.is_some() {
                    tracker.external_session_id = external_session_id;
                }
                self.stream_line(&format!("System: {subtype}"), StreamLevel::Debug)
                    .await?;
            }
            AgentMessage::Text { text } | AgentMessage::Assistant { text } => {
                self.stream_line(&format!("ASSISTANT: {text}"), StreamLevel::Info)
                    .await?;
                self.invoker
                    .transcript
                    .append_record(id, &self.record(ConversationRecord::assistant(text.clone())))
                    .await?;
                EventLogger::log_event(
                    id,
                    SessionEvent::Message {
                        role: "assistant".to_string(),
                        content: text,
                    },
                );
            }
            AgentMessage::ToolCall { name, input } => {
                self.stream_line(&format!("Tool call: {name}"), StreamLevel::Tool)
                    .await?;
                EventLogger::log_event(
                    id,
                    SessionEvent::ToolCall {
                        tool_name: name.clone(),
                        arguments_json: input.to_string(),
                    },
                );
                tracker.tools_used.insert(name);
            }
            AgentMessage::ToolResult { is_error } => {
                if is_error {
                    self.stream_line("Tool result: error", StreamLevel::Tool)
                        .await?;
                }
            }
            AgentMessage::Result {
                result,
                is_error,
                cost_usd,
                duration_ms,
                num_turns,
                external_session_id,
            } => {
                if external_session_id.is_some() {
                    tracker.external_session_id = external_session_id;
                }
                if let Some(text) = &result {
                    tracker.results.insert("result".into(), json!(text));
                }
                if let Some(cost) = cost_usd {
                    tracker.results.insert("costUsd".into(), json!(cost));
                }
                if let Some(ms) = duration_ms {
                    tracker.results.insert("durationMs".into(), json!(ms));
                }
                if let Some(turns) = num_turns {
                    tracker.results.insert("numTurns".into(), json!(turns));
                }

                if is_error {
                    let message = result.unwrap_or_else(|| "Query reported an error".to_string());
                    self.note_error(&message).await;
                    tracker.fail(message);
                } else {
                    self.stream_line("RESULT: success", StreamLevel::Info).await?;
                    tracker.status = Some(SummaryStatus::Completed);
                }
            }
            AgentMessage::Error { message } => {
                self.note_error(&message).await;
                tracker.fail(message);
            }
        }
        Ok(())
    }

    fn record(&self, record: ConversationRecord) -> ConversationRecord {
        if self.continuation {
            record.continuation()
        } else {
            record
        }
    }

    fn query_request(&self) -> QueryRequest {
        QueryRequest {
            prompt: self.prompt.clone(),
            agent_name: self.session.agent_name.clone(),
            system_prompt: self.profile.system_prompt.clone(),
            allowed_tools: self.profile.allowed_tools.clone(),
            model: self.profile.model.clone(),
            max_turns: self.profile.max_turns,
            resume: self.external_session_id.clone(),
            mcp_config: self
                .invoker
                .integrations
                .mcp_servers_config(&self.profile.integrations, &self.invoker.env),
            cwd: self.invoker.cwd.clone(),
        }
    }

    async fn stream_line(&self, line: &str, level: StreamLevel) -> Result<()> {
        if !self.stream_to_file {
            return Ok(());
        }
        self.invoker
            .stream
            .add_streaming_output(&self.session.id, line, level)
            .await
    }

    /// Log a run failure to the stream and event log. A failed stream write
    /// here only warns; the failure itself is already headed for the summary.
    async fn note_error(&self, message: &str) {
        EventLogger::log_event(
            &self.session.id,
            SessionEvent::Error {
                error_msg: message.to_string(),
            },
        );
        if let Err(e) = self
            .stream_line(&format!("ERROR: {message}"), StreamLevel::Info)
            .await
        {
            warn!(session_id = %self.session.id, error = %e, "[Invoker] Failed to log error line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;
    use regex::Regex;
    use serde_json::json;
    use std::path::Path;

    fn layout(dir: &Path) -> SessionLayout {
        SessionLayout::new(dir.join("output_streams"), dir.join("reports"))
    }

    fn invoker(dir: &Path, runner: ScriptedRunner) -> AgentInvoker {
        AgentInvoker::new(layout(dir), Arc::new(runner))
    }

    fn streaming_script() -> Vec<AgentMessage> {
        vec![
            AgentMessage::System {
                subtype: "init".into(),
                external_session_id: Some("ext-1".into()),
            },
            AgentMessage::assistant("Running the checks now"),
            AgentMessage::tool_call("Bash", json!({"command": "cargo test"})),
            AgentMessage::tool_call("Read", json!({"path": "src/lib.rs"})),
            AgentMessage::tool_call("Bash", json!({"command": "cargo fmt"})),
            AgentMessage::assistant("Streaming works"),
            AgentMessage::result("Streaming works"),
        ]
    }

    fn summary_files(dir: &Path, session_id: &str) -> Vec<String> {
        std::fs::read_dir(dir.join("reports").join(session_id))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn streaming_scenario_writes_all_markers() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::new(streaming_script()));

        let outcome = invoker
            .invoke_agent("Test streaming behavior", InvokeOptions::for_agent("testing-agent"))
            .await
            .unwrap();
        assert!(outcome.is_success());

        let log = invoker.stream().read_log(&outcome.session_id).await.unwrap();
        assert!(log.contains("=== Agent Session Started ==="));
        assert!(log.contains(&format!("Session ID: {}", outcome.session_id)));
        assert!(log.contains("USER PROMPT:"));
        assert!(log.contains("Test streaming behavior"));
        assert!(log.contains("ASSISTANT:"));
        assert!(log.contains("[TOOL] Tool call: Bash"));
        let ts = Regex::new(r"\[\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z\]").unwrap();
        assert!(ts.is_match(&log));

        assert_eq!(summary_files(dir.path(), &outcome.session_id), vec!["testing-agent-summary.json"]);
        let tools: Vec<_> = outcome.summary.tools_used.iter().cloned().collect();
        assert_eq!(tools, vec!["Bash", "Read"]);
        assert_eq!(outcome.summary.message_count, 7);
        assert_eq!(outcome.summary.results["result"], "Streaming works");
        assert!(outcome.summary.errors.is_empty());
    }

    #[tokio::test]
    async fn metadata_and_transcript_line_up() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::new(streaming_script()));
        let outcome = invoker
            .invoke_agent("hello", InvokeOptions::for_agent("testing-agent"))
            .await
            .unwrap();

        let metadata = invoker.store().load_session(&outcome.session_id).await.unwrap();
        assert_eq!(metadata.agent_name, "testing-agent");
        assert_eq!(metadata.invocation_count, 1);
        assert_eq!(metadata.external_session_id.as_deref(), Some("ext-1"));

        let records = invoker.transcript().read_records(&outcome.session_id).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].content, "hello");
        assert!(metadata.created_at <= records[0].timestamp);
        assert!(records.iter().all(|r| !r.is_continuation()));
    }

    #[tokio::test]
    async fn continuation_resumes_with_stored_agent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(streaming_script());
        let invoker = invoker(dir.path(), runner.clone());
        let first = invoker
            .invoke_agent("first", InvokeOptions::for_agent("testing-agent"))
            .await
            .unwrap();

        let second = invoker
            .continue_conversation(&first.session_id, "second")
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.agent_name, "testing-agent");

        let requests = runner.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].resume, None);
        assert_eq!(requests[1].resume.as_deref(), Some("ext-1"));

        let records = invoker.transcript().read_records(&first.session_id).await.unwrap();
        assert_eq!(records.len(), 6);
        assert!(records[3..].iter().all(|r| r.is_continuation()));

        let metadata = invoker.store().load_session(&first.session_id).await.unwrap();
        assert_eq!(metadata.invocation_count, 2);
        assert_eq!(summary_files(dir.path(), &first.session_id).len(), 1);

        let log = invoker.stream().read_log(&first.session_id).await.unwrap();
        assert_eq!(log.matches("=== Agent Session Started ===").count(), 1);
    }

    #[tokio::test]
    async fn unknown_session_fails_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::with_response("unused");
        let invoker = invoker(dir.path(), runner.clone());

        let err = invoker
            .continue_conversation("20990101-000000-missing", "hi")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("20990101-000000-missing"));
        assert!(msg.contains("not found"));
        assert!(matches!(
            err.downcast_ref::<ConductorError>(),
            Some(ConductorError::SessionNotFound(_))
        ));
        assert!(!dir.path().join("output_streams").exists());
        assert!(!dir.path().join("reports").exists());
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn busy_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::with_response("ok"));
        let first = invoker
            .invoke_agent("first", InvokeOptions::for_agent("a"))
            .await
            .unwrap();

        let held = invoker
            .start("second", InvokeOptions::continuing(first.session_id.clone()))
            .await
            .unwrap();
        assert_eq!(held.state(), InvocationState::Idle);

        let err = invoker
            .continue_conversation(&first.session_id, "third")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is busy"));

        let outcome = held.run().await.unwrap();
        assert!(outcome.is_success());
        assert!(invoker
            .continue_conversation(&first.session_id, "fourth")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn timeout_fails_and_still_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::with_response("late").with_delay(Duration::from_secs(5));
        let invoker = invoker(dir.path(), runner);

        let outcome = invoker
            .invoke_agent(
                "slow",
                InvokeOptions::for_agent("a").with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, SummaryStatus::Failed);
        assert!(outcome.summary.errors[0].contains("Invocation timed out after"));
        assert!(outcome.summary_path.exists());

        let log = invoker.stream().read_log(&outcome.session_id).await.unwrap();
        assert!(log.contains("ERROR: Invocation timed out"));
        assert!(!invoker.store().is_busy(&outcome.session_id));
    }

    #[tokio::test]
    async fn runner_error_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![
            AgentMessage::assistant("trying"),
            AgentMessage::error("rate limited"),
            AgentMessage::assistant("never seen"),
        ]);
        let invoker = invoker(dir.path(), runner);
        let outcome = invoker
            .invoke_agent("go", InvokeOptions::for_agent("a"))
            .await
            .unwrap();
        assert_eq!(outcome.status, SummaryStatus::Failed);
        assert_eq!(outcome.summary.errors, vec!["rate limited"]);
        assert_eq!(outcome.summary.message_count, 2);
    }

    #[tokio::test]
    async fn failed_start_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![]).failing_start("claude: not found");
        let invoker = invoker(dir.path(), runner);
        let outcome = invoker
            .invoke_agent("go", InvokeOptions::for_agent("a"))
            .await
            .unwrap();
        assert_eq!(outcome.status, SummaryStatus::Failed);
        assert!(outcome.summary.errors[0].contains("claude: not found"));
    }

    #[tokio::test]
    async fn stream_file_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::with_response("ok"));
        let options = InvokeOptions {
            stream_to_file: false,
            ..InvokeOptions::for_agent("a")
        };
        let outcome = invoker.invoke_agent("quiet", options).await.unwrap();
        assert!(outcome.is_success());
        assert!(invoker.stream().read_log(&outcome.session_id).await.is_err());
        assert_eq!(
            invoker.transcript().read_records(&outcome.session_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn profile_flows_into_request() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::with_response("ok");
        let mut catalog = AgentCatalog::default();
        catalog.insert(AgentProfile {
            system_prompt: Some("You review code.".into()),
            allowed_tools: vec!["Read".into()],
            max_turns: Some(3),
            ..AgentProfile::bare("reviewer")
        });
        let invoker = invoker(dir.path(), runner.clone()).with_agents(Arc::new(catalog));

        invoker
            .invoke_agent("review", InvokeOptions::for_agent("reviewer"))
            .await
            .unwrap();
        let request = &runner.requests()[0];
        assert_eq!(request.system_prompt.as_deref(), Some("You review code."));
        assert_eq!(request.allowed_tools, vec!["Read"]);
        assert_eq!(request.max_turns, Some(3));
        assert!(request.mcp_config.is_none());
    }

    #[tokio::test]
    async fn new_session_needs_agent_name() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::with_response("ok"));
        let err = invoker
            .start("hi", InvokeOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConductorError::ConfigError(_)));
    }
}

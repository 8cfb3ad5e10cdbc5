//! `launch`, `run` and `continue`.

use std::process::{ExitCode, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use conductor_agent::{AgentInvoker, InvocationOutcome, InvokeOptions};
use conductor_config::{AgentProfile, Settings};
use tokio::process::Command;
use tracing::info;

use crate::terminal_output::{note_error, note_info, note_success, note_warn};

pub const RUN_USAGE: &str =
    "Usage: conductor run <agent> <prompt> [--timeout <secs>] [--continue <session-id>] [--no-stream-file]";

/// Arguments for an interactive session of the external CLI.
pub fn launch_args(profile: &AgentProfile, prompt: &str, mcp_config: Option<&serde_json::Value>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(system_prompt) = &profile.system_prompt {
        args.push("--append-system-prompt".to_string());
        args.push(system_prompt.clone());
    }
    if !profile.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(profile.allowed_tools.join(","));
    }
    if let Some(model) = &profile.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(mcp) = mcp_config {
        args.push("--mcp-config".to_string());
        args.push(mcp.to_string());
    }
    args.push(prompt.to_string());
    args
}

/// Hand the terminal to the external CLI and return its exit code.
pub async fn launch(settings: &Settings, agent: &str, prompt: &str) -> Result<ExitCode> {
    let profile = match settings.agents.get(agent) {
        Some(profile) => profile.clone(),
        None => {
            note_warn(&format!("No definition for agent {agent}; launching with defaults"));
            AgentProfile::bare(agent)
        }
    };
    let mcp = settings
        .integrations
        .mcp_servers_config(&profile.integrations, &settings.env);
    let args = launch_args(&profile, prompt, mcp.as_ref());

    info!(agent = %agent, command = %settings.config.query_command, "Launching interactive session");
    let status = Command::new(&settings.config.query_command)
        .args(&args)
        .envs(settings.env.file_vars())
        .current_dir(&settings.config.root)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to launch {}", settings.config.query_command))?;

    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

pub struct RunArgs {
    pub agent: String,
    pub prompt: Option<String>,
    pub timeout_secs: Option<u64>,
    pub continue_session_id: Option<String>,
    pub no_stream_file: bool,
}

/// A tracked, non-interactive run. Exit 1 on a missing prompt or a run that
/// did not complete.
pub async fn run(invoker: &AgentInvoker, args: RunArgs) -> Result<ExitCode> {
    let Some(prompt) = args.prompt.filter(|p| !p.trim().is_empty()) else {
        eprintln!("{RUN_USAGE}");
        return Ok(ExitCode::FAILURE);
    };

    let options = InvokeOptions {
        agent_name: Some(args.agent),
        timeout: args.timeout_secs.map(Duration::from_secs),
        stream_to_file: !args.no_stream_file,
        continue_session_id: args.continue_session_id,
    };
    execute(invoker, prompt, options).await
}

pub async fn continue_session(invoker: &AgentInvoker, session_id: String, prompt: String) -> Result<ExitCode> {
    execute(invoker, prompt, InvokeOptions::continuing(session_id)).await
}

async fn execute(invoker: &AgentInvoker, prompt: String, options: InvokeOptions) -> Result<ExitCode> {
    let invocation = match invoker.start(prompt, options).await {
        Ok(invocation) => invocation,
        Err(e) => {
            note_error(&e.to_string());
            return Ok(ExitCode::FAILURE);
        }
    };
    note_info(&format!(
        "Session {} ({}{})",
        invocation.session_id(),
        invocation.agent_name(),
        if invocation.is_continuation() { ", continued" } else { "" }
    ));

    let outcome = invocation.run().await?;
    report(&outcome);
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(outcome: &InvocationOutcome) {
    if let Some(result) = outcome.summary.results.get("result").and_then(|v| v.as_str()) {
        println!("{result}");
    }
    let tools = if outcome.summary.tools_used.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = outcome.summary.tools_used.iter().map(String::as_str).collect();
        format!(", tools: {}", names.join(", "))
    };
    let line = format!(
        "{} {} in session {} ({} messages{tools})",
        outcome.agent_name, outcome.status, outcome.session_id, outcome.summary.message_count
    );
    if outcome.is_success() {
        note_success(&line);
    } else {
        note_error(&line);
        for err in &outcome.summary.errors {
            note_error(err);
        }
    }
    note_info(&format!("Summary: {}", outcome.summary_path.display()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_agent::ScriptedRunner;
    use conductor_core::AgentMessage;
    use conductor_session::SessionLayout;
    use std::sync::Arc;

    fn invoker(dir: &std::path::Path, runner: ScriptedRunner) -> AgentInvoker {
        AgentInvoker::new(
            SessionLayout::new(dir.join("output_streams"), dir.join("reports")),
            Arc::new(runner),
        )
    }

    fn args(prompt: Option<&str>) -> RunArgs {
        RunArgs {
            agent: "testing-agent".into(),
            prompt: prompt.map(String::from),
            timeout_secs: None,
            continue_session_id: None,
            no_stream_file: false,
        }
    }

    #[test]
    fn launch_args_end_with_prompt() {
        let profile = AgentProfile {
            allowed_tools: vec!["Read".into(), "Edit".into()],
            model: Some("opus".into()),
            ..AgentProfile::bare("dev")
        };
        let args = launch_args(&profile, "fix the bug", None);
        assert_eq!(args, vec!["--allowedTools", "Read,Edit", "--model", "opus", "fix the bug"]);
    }

    #[tokio::test]
    async fn missing_prompt_exits_one_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::with_response("x"));
        let code = run(&invoker, args(None)).await.unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(!dir.path().join("output_streams").exists());
    }

    #[tokio::test]
    async fn completed_run_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::with_response("done"));
        assert_eq!(run(&invoker, args(Some("go"))).await.unwrap(), ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn failed_run_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::new(vec![AgentMessage::error("nope")]));
        assert_eq!(run(&invoker, args(Some("go"))).await.unwrap(), ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn continuing_unknown_session_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker(dir.path(), ScriptedRunner::with_response("x"));
        let code = continue_session(&invoker, "20990101-000000-none".into(), "hi".into())
            .await
            .unwrap();
        assert_eq!(code, ExitCode::FAILURE);
    }
}

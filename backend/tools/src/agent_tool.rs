//! `agent_invoke` / `agent_continue`: run another agent through the invoker
//! and hand back its summary.

use anyhow::Result;
use async_trait::async_trait;
use conductor_agent::{AgentInvoker, InvocationOutcome, InvokeOptions};
use conductor_core::{ConductorError, ToolDefinition, ToolHandler, ToolOutput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::parse_args;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvokeArgs {
    agent: String,
    prompt: String,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinueArgs {
    session_id: String,
    prompt: String,
}

pub struct AgentHandler {
    invoker: AgentInvoker,
}

impl AgentHandler {
    pub fn new(invoker: AgentInvoker) -> Self {
        Self { invoker }
    }
}

fn summary_output(outcome: &InvocationOutcome) -> Result<ToolOutput> {
    let value = serde_json::to_value(&outcome.summary)?;
    let mut output = ToolOutput::json(&value);
    output.is_error = !outcome.is_success();
    Ok(output)
}

#[async_trait]
impl ToolHandler for AgentHandler {
    fn namespace(&self) -> &str {
        "agent"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "agent_invoke",
                "Start a new session with the named agent and return its summary.",
                json!({
                    "type": "object",
                    "properties": {
                        "agent": {"type": "string"},
                        "prompt": {"type": "string"},
                        "timeoutSecs": {"type": "integer", "minimum": 1}
                    },
                    "required": ["agent", "prompt"]
                }),
            ),
            ToolDefinition::new(
                "agent_continue",
                "Continue an existing session and return the new summary.",
                json!({
                    "type": "object",
                    "properties": {
                        "sessionId": {"type": "string"},
                        "prompt": {"type": "string"}
                    },
                    "required": ["sessionId", "prompt"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        let outcome = match tool {
            "agent_invoke" => {
                let args: InvokeArgs = parse_args(tool, args)?;
                let mut options = InvokeOptions::for_agent(args.agent);
                if let Some(secs) = args.timeout_secs {
                    options = options.with_timeout(Duration::from_secs(secs));
                }
                self.invoker.invoke_agent(args.prompt, options).await?
            }
            "agent_continue" => {
                let args: ContinueArgs = parse_args(tool, args)?;
                self.invoker
                    .continue_conversation(&args.session_id, args.prompt)
                    .await?
            }
            other => return Err(ConductorError::UnknownTool(other.to_string()).into()),
        };
        summary_output(&outcome)
    }
}

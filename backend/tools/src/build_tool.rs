use anyhow::Result;
use async_trait::async_trait;
use conductor_config::BuildCommands;
use conductor_core::{ConductorError, ToolDefinition, ToolHandler, ToolOutput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::exec::{exec_command, shell_quote, ExecConfig};
use crate::parse_args;

#[derive(Debug, Default, Deserialize)]
struct BuildArgs {
    #[serde(default)]
    args: Vec<String>,
}

/// `build_run`, `build_lint`, `build_test`: the configured commands, run in
/// the workspace root.
pub struct BuildHandler {
    root: PathBuf,
    commands: BuildCommands,
}

impl BuildHandler {
    pub fn new(root: impl Into<PathBuf>, commands: BuildCommands) -> Self {
        Self {
            root: root.into(),
            commands,
        }
    }

    fn command_for(&self, tool: &str) -> Option<&str> {
        match tool {
            "build_run" => Some(&self.commands.build),
            "build_lint" => Some(&self.commands.lint),
            "build_test" => Some(&self.commands.test),
            _ => None,
        }
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "args": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Extra arguments appended to the command"
            }
        }
    })
}

#[async_trait]
impl ToolHandler for BuildHandler {
    fn namespace(&self) -> &str {
        "build"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("build_run", format!("Build the workspace (`{}`).", self.commands.build), schema()),
            ToolDefinition::new("build_lint", format!("Lint the workspace (`{}`).", self.commands.lint), schema()),
            ToolDefinition::new("build_test", format!("Run the test suite (`{}`).", self.commands.test), schema()),
        ]
    }

    async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        let base = self
            .command_for(tool)
            .ok_or_else(|| ConductorError::UnknownTool(tool.to_string()))?;
        let BuildArgs { args } = parse_args(tool, args)?;

        let mut command = base.to_string();
        for arg in &args {
            command.push(' ');
            command.push_str(&shell_quote(arg));
        }

        let config = ExecConfig {
            cwd: Some(self.root.clone()),
            timeout: Duration::from_secs(self.commands.timeout_secs),
            ..ExecConfig::new(command)
        };
        let result = exec_command(&config).await?;
        info!("[BuildTool] {tool} exited with {}", result.exit_code);

        let text = format!(
            "exit code: {}{}\n--- stdout ---\n{}\n--- stderr ---\n{}",
            result.exit_code,
            if result.timed_out { " (timed out)" } else { "" },
            result.stdout.trim_end(),
            result.stderr.trim_end()
        );
        Ok(if result.success() {
            ToolOutput::ok(text)
        } else {
            ToolOutput::error(text)
        })
    }
}

//! Tool handler modules for the Conductor MCP server.
//!
//! Each handler owns one namespace and a fixed set of tool names:
//! `file`, `build`, `agent`, `session`.

pub mod agent_tool;
pub mod build_tool;
pub mod exec;
pub mod file;
pub mod session_tool;

pub use agent_tool::AgentHandler;
pub use build_tool::BuildHandler;
pub use file::FileHandler;
pub use session_tool::SessionHandler;

use anyhow::{Context, Result};
use conductor_agent::AgentInvoker;
use conductor_config::Config;
use conductor_core::ToolHandler;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Deserialize tool arguments; absent arguments count as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).with_context(|| format!("Invalid arguments for {tool}"))
}

/// The standard handler set for a workspace.
pub fn standard_handlers(config: &Config, invoker: AgentInvoker) -> Vec<Arc<dyn ToolHandler>> {
    let store = invoker.store().clone();
    let summaries = invoker.summaries().clone();
    let file: Arc<dyn ToolHandler> = Arc::new(FileHandler::new(
        &config.root,
        config.allowed_write_roots.clone(),
    ));
    let build: Arc<dyn ToolHandler> = Arc::new(BuildHandler::new(&config.root, config.build.clone()));
    let agent: Arc<dyn ToolHandler> = Arc::new(AgentHandler::new(invoker));
    let session: Arc<dyn ToolHandler> = Arc::new(SessionHandler::new(store, summaries));
    vec![file, build, agent, session]
}

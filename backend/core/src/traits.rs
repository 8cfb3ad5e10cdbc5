use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::message::AgentMessage;
use crate::tools::{ToolDefinition, ToolOutput};

/// The asynchronous sequence of messages a query run produces.
pub type MessageStream = BoxStream<'static, Result<AgentMessage>>;

/// Everything a runner needs to drive one query against an agent.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub prompt: String,
    pub agent_name: String,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// The runner's own conversation id to resume, if continuing.
    pub resume: Option<String>,
    /// `{"mcpServers": {...}}` built from the resolved integrations.
    pub mcp_config: Option<Value>,
    pub cwd: Option<PathBuf>,
}

/// The external LLM query collaborator.
///
/// Dropping the returned stream must abort the underlying run.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Runner name for logs (e.g., "claude-cli").
    fn name(&self) -> &str;

    /// Start a query and return its message stream.
    async fn query(&self, request: QueryRequest) -> Result<MessageStream>;
}

/// A module of tools sharing one namespace (e.g., "file", "build").
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Namespace this handler owns.
    fn namespace(&self) -> &str;

    /// Every tool this handler answers to, by exact name.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute one tool. Handlers validate their own arguments.
    async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput>;
}

//! Tool Router: exact tool-name dispatch across handler modules.

use std::collections::HashMap;
use std::sync::Arc;

use conductor_core::{ConductorError, ToolDefinition, ToolHandler};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::ToolCallResult;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("tool {tool} is exposed by both {first} and {second}")]
    DuplicateTool {
        tool: String,
        first: String,
        second: String,
    },
}

#[derive(Default)]
pub struct ToolRouter {
    handlers: Vec<Arc<dyn ToolHandler>>,
    by_name: HashMap<String, usize>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from a handler set, rejecting duplicate tool names.
    pub fn with_handlers(
        handlers: impl IntoIterator<Item = Arc<dyn ToolHandler>>,
    ) -> Result<Self, RegistrationError> {
        let mut router = Self::new();
        for handler in handlers {
            router.register(handler)?;
        }
        Ok(router)
    }

    /// Add a handler. Nothing is registered if any of its names is taken.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), RegistrationError> {
        let tools = handler.tools();
        for tool in &tools {
            if let Some(&idx) = self.by_name.get(&tool.name) {
                return Err(RegistrationError::DuplicateTool {
                    tool: tool.name.clone(),
                    first: self.handlers[idx].namespace().to_string(),
                    second: handler.namespace().to_string(),
                });
            }
        }
        let mut seen = std::collections::HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(RegistrationError::DuplicateTool {
                    tool: tool.name.clone(),
                    first: handler.namespace().to_string(),
                    second: handler.namespace().to_string(),
                });
            }
        }

        let idx = self.handlers.len();
        info!(
            "[ToolRouter] Registered namespace {} ({} tools)",
            handler.namespace(),
            tools.len()
        );
        for tool in tools {
            self.by_name.insert(tool.name.clone(), idx);
            self.definitions.push(tool);
        }
        self.handlers.push(handler);
        Ok(())
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.by_name.contains_key(local_name(name))
    }

    /// Dispatch a call. Unknown tools and handler errors come back as
    /// `isError` results; this never fails.
    pub async fn call(&self, name: &str, args: Value) -> ToolCallResult {
        let local = local_name(name);
        let Some(&idx) = self.by_name.get(local) else {
            warn!("[ToolRouter] Unknown tool {name}");
            return ToolCallResult::error(ConductorError::UnknownTool(name.to_string()).to_string());
        };

        debug!("[ToolRouter] {name} -> {}", self.handlers[idx].namespace());
        match self.handlers[idx].call(local, args).await {
            Ok(output) if output.is_error => ToolCallResult::error(output.text),
            Ok(output) => ToolCallResult::text(output.text),
            Err(e) => {
                warn!("[ToolRouter] {local} failed: {e:#}");
                ToolCallResult::error(format!("{e:#}"))
            }
        }
    }
}

/// `mcp__<server>__<tool>` -> `<tool>`; plain names pass through.
pub fn local_name(name: &str) -> &str {
    name.rsplit("__").next().unwrap_or(name)
}

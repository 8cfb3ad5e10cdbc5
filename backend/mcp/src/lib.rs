//! Conductor MCP tool server.
//!
//! JSON-RPC 2.0 over newline-delimited stdio, answering `initialize`,
//! `ping`, `tools/list` and `tools/call` from a [`ToolRouter`].

pub mod protocol;
pub mod router;
pub mod server;

pub use protocol::{McpContent, McpRequest, McpResponse, McpRpcError, ToolCallResult};
pub use router::{local_name, RegistrationError, ToolRouter};
pub use server::McpServer;

//! Newline-delimited JSON-RPC server loop.
//!
//! Stdout belongs to the protocol; all logging goes through `tracing`, which
//! the binary points at stderr in this mode.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{
    initialize_result, McpRequest, McpResponse, McpRpcError, ToolCallParams, INTERNAL_ERROR, INVALID_REQUEST,
    JSONRPC_VERSION,
};
use crate::router::ToolRouter;

/// Requests are handled on their own tasks; a single writer serializes the
/// responses so each one stays on its own line.
#[derive(Clone)]
pub struct McpServer {
    router: Arc<ToolRouter>,
    name: String,
    version: String,
}

impl McpServer {
    pub fn new(router: ToolRouter) -> Self {
        Self {
            router: Arc::new(router),
            name: "conductor".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve one connection until `reader` reaches EOF and every in-flight
    /// request has been answered.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            "[McpServer] Serving {} tools",
            self.router.definitions().len()
        );
        let (tx, mut rx) = mpsc::unbounded_channel::<McpResponse>();

        let read = async move {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = match String::from_utf8(std::mem::take(&mut buf)) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("[McpServer] Skipping line that is not UTF-8: {e}");
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let server = self.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = server.handle_line(&line).await {
                        let _ = tx.send(response);
                    }
                });
            }
            info!("[McpServer] Input closed, draining in-flight requests");
            anyhow::Ok(())
        };

        let write = async move {
            while let Some(response) = rx.recv().await {
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                writer.write_all(&out).await?;
                writer.flush().await?;
            }
            anyhow::Ok(())
        };

        let (read, write) = tokio::join!(read, write);
        read?;
        write?;
        info!("[McpServer] Shutting down");
        Ok(())
    }

    /// Handle one line; `None` when nothing should be written back.
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("[McpServer] Skipping malformed line: {e}");
                return None;
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            warn!("[McpServer] Unsupported jsonrpc version {:?}", request.jsonrpc);
            return request.id.map(|id| {
                McpResponse::failure(id, McpRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""))
            });
        }
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        debug!("[McpServer] <- {}", request.method);
        if request.is_notification() {
            debug!("[McpServer] Notification {}", request.method);
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => Ok(initialize_result(&self.name, &self.version)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.router.definitions() })),
            "tools/call" => self.tools_call(request.params).await,
            other => Err(McpRpcError::method_not_found(other)),
        };

        Some(match result {
            Ok(value) => McpResponse::success(id, value),
            Err(error) => McpResponse::failure(id, error),
        })
    }

    async fn tools_call(&self, params: Option<Value>) -> Result<Value, McpRpcError> {
        let params: ToolCallParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpRpcError::invalid_params(format!("Invalid tools/call params: {e}")))?;
        let result = self.router.call(&params.name, params.arguments).await;
        serde_json::to_value(result)
            .map_err(|e| McpRpcError::new(INTERNAL_ERROR, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::METHOD_NOT_FOUND;
    use anyhow::Result;
    use async_trait::async_trait;
    use conductor_core::{ToolDefinition, ToolHandler, ToolOutput};
    use std::sync::Arc;
    use std::time::Duration;

    struct Greeter;

    #[async_trait]
    impl ToolHandler for Greeter {
        fn namespace(&self) -> &str {
            "greet"
        }

        fn tools(&self) -> Vec<ToolDefinition> {
            vec![
                ToolDefinition::new("greet_hello", "Say hello", json!({"type": "object"})),
                ToolDefinition::new("greet_slowly", "Say hello after a pause", json!({"type": "object"})),
            ]
        }

        async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
            if tool == "greet_slowly" {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Ok(ToolOutput::ok(format!(
                "hello {}",
                args["name"].as_str().unwrap_or("world")
            )))
        }
    }

    fn server() -> McpServer {
        let handler: Arc<dyn ToolHandler> = Arc::new(Greeter);
        McpServer::new(ToolRouter::with_handlers([handler]).unwrap())
    }

    async fn serve_bytes(input: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        server().serve(input, &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    /// Responses sorted by numeric id.
    async fn roundtrip(input: &str) -> Vec<Value> {
        let mut responses = serve_bytes(input.as_bytes()).await;
        responses.sort_by_key(|r| r["id"].as_i64().unwrap_or(i64::MAX));
        responses
    }

    #[tokio::test]
    async fn full_session() {
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "this is not json",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"greet_hello","arguments":{"name":"ada"}}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","id":6,"method":"ping"}"#,
        ]
        .join("\n");

        let responses = roundtrip(&input).await;
        assert_eq!(responses.len(), 6);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "conductor");

        assert_eq!(responses[1]["result"]["tools"][0]["name"], "greet_hello");
        assert!(responses[1]["result"]["tools"][0]["inputSchema"].is_object());

        assert_eq!(responses[2]["result"]["content"][0]["text"], "hello ada");

        assert_eq!(responses[3]["result"]["isError"], true);
        assert_eq!(responses[3]["result"]["content"][0]["text"], "Unknown tool: nope");

        assert_eq!(responses[4]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(responses[5]["id"], 6);
    }

    #[tokio::test]
    async fn bad_params_are_invalid_params() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":"x","method":"tools/call","params":{"arguments":{}}}"#)
            .await
            .unwrap();
        assert_eq!(response.id, json!("x"));
        assert_eq!(response.error.unwrap().code, crate::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn non_utf8_line_is_skipped() {
        let mut input = b"\xff\xfe not utf8\n".to_vec();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#);
        input.push(b'\n');

        let responses = serve_bytes(&input).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 7);
        assert_eq!(responses[0]["result"], json!({}));
    }

    #[tokio::test]
    async fn slow_call_does_not_block_ping() {
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"greet_slowly","arguments":{"name":"bo"}}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        ]
        .join("\n");

        let responses = serve_bytes(input.as_bytes()).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 2);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "hello bo");
    }
}

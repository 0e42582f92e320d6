//! MCP Server over Stdio
//!
//! One JSON object per line on stdin, one per line on stdout. Logs go to
//! stderr only, so the protocol stream stays clean.
//!
//! Command-level failures (validation, execution, policy) are reported as
//! tool results with `isError: true`, never as JSON-RPC errors: the protocol
//! worked, the command did not. JSON-RPC errors are reserved for protocol
//! problems (unparseable line, unknown method, bad params).

use super::protocol::{McpError, McpRequest, McpResponse};
use super::registry::{call_az_tool, initialize_result, CALL_AZ_TOOL};
use crate::azcli::{AzClient, MAX_TIMEOUT};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

/// The MCP server: request dispatch over a line-delimited stdio transport.
pub struct McpServer {
    client: Arc<AzClient>,
    read_only_mode: bool,
}

impl McpServer {
    pub fn new(client: Arc<AzClient>, read_only_mode: bool) -> Self {
        Self {
            client,
            read_only_mode,
        }
    }

    /// Serve requests from stdin until it closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut serialized =
                    serde_json::to_vec(&response).context("failed to serialize response")?;
                serialized.push(b'\n');
                stdout
                    .write_all(&serialized)
                    .await
                    .context("failed to write stdout")?;
                stdout.flush().await.context("failed to flush stdout")?;
            }
        }

        debug!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one line of input. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!("unparseable request line: {}", err);
                return Some(McpResponse::err(Value::Null, McpError::parse_error()));
            }
        };

        if request.is_notification() {
            debug!(method = %request.method, "notification received");
            return None;
        }

        Some(self.handle_request(request).await)
    }

    /// Dispatch a request with an id to its method handler.
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, "handling request");

        match request.method.as_str() {
            "initialize" => McpResponse::ok(id, initialize_result()),
            "ping" => McpResponse::ok(id, json!({})),
            "tools/list" => McpResponse::ok(
                id,
                json!({ "tools": [call_az_tool(self.read_only_mode)] }),
            ),
            "tools/call" => match self.handle_tools_call(request.params.as_ref()).await {
                Ok(result) => McpResponse::ok(id, result),
                Err(err) => McpResponse::err(id, err),
            },
            method => McpResponse::err(id, McpError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let params = params.ok_or_else(|| McpError::invalid_params("params are required"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::invalid_params("tool name is required"))?;

        if name != CALL_AZ_TOOL {
            return Err(McpError::invalid_params(format!("unknown tool: {}", name)));
        }

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        Ok(self.call_az(&arguments).await)
    }

    /// Execute the `call_az` tool. Always returns a tool result; failures
    /// are text content flagged with `isError`.
    async fn call_az(&self, arguments: &Value) -> Value {
        let Some(command) = arguments.get("cli_command").and_then(Value::as_str) else {
            warn!("missing cli_command parameter");
            return tool_error("cli_command is required");
        };

        let timeout = arguments
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| Duration::from_secs_f64(secs.min(MAX_TIMEOUT.as_secs_f64())));

        debug!(command, ?timeout, "executing command");

        if let Err(err) = self.client.validate_command(command) {
            warn!("command validation failed: {}", err);
            return tool_error(format!("validation error: {}", err));
        }

        match self.client.execute_command(command, timeout).await {
            Err(err) => {
                warn!("command execution failed: {}", err);
                tool_error(format!("execution error: {}", err))
            }
            Ok(result) if result.exit_code != 0 => {
                warn!(
                    "command failed with exit code {}: {}",
                    result.exit_code, result.error
                );
                tool_error(format!(
                    "command failed (exit code {}): {}",
                    result.exit_code, result.error
                ))
            }
            Ok(result) => {
                debug!(duration_ms = result.duration.as_millis() as u64, "command succeeded");
                tool_text(result.output)
            }
        }
    }
}

fn tool_text(text: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }]
    })
}

fn tool_error(text: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }],
        "isError": true
    })
}

//! MCP client session: the logical connection built on top of a transport.
//!
//! [`Connector`] and [`ToolSession`] are the seam between the bridge and the
//! wire: the bridge only ever asks a connector for a fresh session and asks a
//! session for its tools. [`StdioConnector`] / [`McpSession`] are the
//! production implementations speaking MCP over a child process's stdio.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::transport::{extract_result, format_stderr_suffix, StdioTransport};
use super::types::{
    InitializeResult, ListToolsResult, ServerInfo, ToolCallResult, ToolDefinition,
    PROTOCOL_VERSION,
};
use crate::config::{ConnectionPolicy, TransportConfig};
use crate::errors::BridgeError;

/// Upper bound on `tools/list` pages, guards against a cursor loop.
const MAX_TOOL_PAGES: usize = 64;

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A live client session with the tool provider.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Query the provider for its current tool set.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BridgeError>;

    /// Invoke a tool by its provider-side name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, BridgeError>;

    /// Close the session and release the underlying transport.
    async fn close(&self) -> Result<(), BridgeError>;

    /// Provider identity reported during the handshake.
    fn server_info(&self) -> Option<ServerInfo> {
        None
    }
}

/// Builds a new session: launch the transport, then perform the handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ToolSession>, BridgeError>;
}

// ─── StdioConnector ──────────────────────────────────────────────────────────

/// Spawns the configured tool provider and speaks MCP over its stdio.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    transport: TransportConfig,
    request_timeout: Duration,
}

impl StdioConnector {
    pub fn new(transport: TransportConfig, policy: &ConnectionPolicy) -> Self {
        Self {
            transport,
            request_timeout: policy.connection_timeout(),
        }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self) -> Result<Arc<dyn ToolSession>, BridgeError> {
        let transport = StdioTransport::spawn(&self.transport)?;
        let startup_timeout = self.transport.startup_timeout();

        let outcome = tokio::time::timeout(startup_timeout, handshake(&transport)).await;
        let server_info = match outcome {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let stderr = transport.stderr_tail();
                close_after_failed_handshake(&transport).await;
                return Err(BridgeError::InitFailed {
                    reason: format!("{e}{}", format_stderr_suffix(&stderr)),
                });
            }
            Err(_) => {
                let stderr = transport.stderr_tail();
                close_after_failed_handshake(&transport).await;
                return Err(BridgeError::InitFailed {
                    reason: format!(
                        "handshake timed out after {}ms{}",
                        startup_timeout.as_millis(),
                        format_stderr_suffix(&stderr)
                    ),
                });
            }
        };

        tracing::info!(
            command = %self.transport.command,
            server = ?server_info.as_ref().and_then(|s| s.name.clone()),
            version = ?server_info.as_ref().and_then(|s| s.version.clone()),
            "MCP session established"
        );

        Ok(Arc::new(McpSession {
            transport,
            server_info,
            request_timeout: self.request_timeout,
        }))
    }
}

async fn close_after_failed_handshake(transport: &StdioTransport) {
    if let Err(e) = transport.close().await {
        tracing::warn!(error = %e, "error closing tool provider after failed handshake");
    }
}

/// Perform the MCP initialization handshake.
async fn handshake(transport: &StdioTransport) -> Result<Option<ServerInfo>, BridgeError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = transport.request("initialize", Some(params)).await?;
    let result = extract_result(response)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| BridgeError::InitFailed {
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    if let Some(version) = init.protocol_version.as_deref() {
        if version != PROTOCOL_VERSION {
            tracing::debug!(server_version = version, "provider negotiated a different protocol version");
        }
    }

    transport.notify("notifications/initialized", None).await?;
    Ok(init.server_info)
}

// ─── McpSession ──────────────────────────────────────────────────────────────

/// MCP session over a [`StdioTransport`]. Exclusively owns the transport.
pub struct McpSession {
    transport: StdioTransport,
    server_info: Option<ServerInfo>,
    request_timeout: Duration,
}

impl McpSession {
    /// Send a request bounded by the per-request timeout.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, BridgeError> {
        if self.transport.has_exited() {
            return Err(BridgeError::ServerCrashed {
                reason: format!(
                    "process exited{}",
                    format_stderr_suffix(&self.transport.stderr_tail())
                ),
            });
        }

        let response = tokio::time::timeout(
            self.request_timeout,
            self.transport.request(method, params),
        )
        .await
        .map_err(|_| BridgeError::Timeout {
            operation: method.to_string(),
            timeout_ms: self.request_timeout.as_millis() as u64,
        })?
        .map_err(|e| {
            if e.is_connection_loss() {
                BridgeError::ServerCrashed {
                    reason: e.to_string(),
                }
            } else {
                e
            }
        })?;

        extract_result(response)
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BridgeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;

            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| BridgeError::TransportError {
                    reason: format!("failed to parse tools/list response: {e}"),
                })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(pages = MAX_TOOL_PAGES, "tools/list pagination limit reached");
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, BridgeError> {
        let start = Instant::now();
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let outcome = self.request("tools/call", Some(params)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let is_error = result
                    .get("isError")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let mut call = ToolCallResult {
                    tool_name: name.to_string(),
                    success: !is_error,
                    result: Some(result),
                    error: None,
                    execution_time_ms: elapsed,
                };
                if is_error {
                    call.error = Some(call.text());
                }
                Ok(call)
            }
            // Protocol-level refusal: report it to the model, not as a bridge failure
            Err(BridgeError::ServerError { code, message, .. }) => Ok(ToolCallResult {
                tool_name: name.to_string(),
                success: false,
                result: None,
                error: Some(format!("[{code}] {message}")),
                execution_time_ms: elapsed,
            }),
            Err(e) => Err(e),
        }
    }

    async fn close(&self) -> Result<(), BridgeError> {
        self.transport.close().await
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.clone()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

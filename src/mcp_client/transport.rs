//! JSON-RPC over stdio transport.
//!
//! Owns the tool-provider child process and its pipes:
//! - Writing JSON-RPC requests to stdin
//! - Reading JSON-RPC responses from stdout
//! - Forwarding stderr to the log, keeping a short tail for error reports
//! - Line-delimited JSON protocol (one JSON object per line)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::types::{
    error_codes, Incoming, JsonRpcMessage, JsonRpcNotification, JsonRpcReply, JsonRpcRequest,
    JsonRpcResponse,
};
use crate::config::TransportConfig;
use crate::errors::BridgeError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Grace period for the provider to exit after stdin is closed.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Number of stderr lines retained for failure context.
const STDERR_TAIL_LINES: usize = 20;

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

struct Pipes {
    /// `None` once the transport has been closed (stdin EOF sent).
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

/// Bi-directional JSON-RPC transport over a child process's stdio.
///
/// One request/response exchange runs at a time: the pipes are locked for the
/// whole exchange so responses cannot be consumed by the wrong caller.
pub struct StdioTransport {
    command: String,
    child: Mutex<Child>,
    pipes: Mutex<Pipes>,
    stderr_tail: Arc<parking_lot::Mutex<VecDeque<String>>>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn the tool-provider process described by `config`.
    pub fn spawn(config: &TransportConfig) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(!config.keep_alive);

        let mut child = cmd.spawn().map_err(|e| BridgeError::SpawnFailed {
            command: config.command.clone(),
            reason: format!("{e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::SpawnFailed {
            command: config.command.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::SpawnFailed {
            command: config.command.clone(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr_tail = Arc::new(parking_lot::Mutex::new(VecDeque::new()));
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr, Arc::clone(&stderr_tail));
        }

        tracing::debug!(
            command = %config.command,
            args = ?config.args,
            pid = ?child.id(),
            "tool provider process spawned"
        );

        Ok(Self {
            command: config.command.clone(),
            child: Mutex::new(child),
            pipes: Mutex::new(Pipes {
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
            }),
            stderr_tail,
            closed: AtomicBool::new(false),
        })
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Writes one line of JSON, then reads lines until a response with a
    /// matching `id` arrives. Provider requests received meanwhile are
    /// answered; log output and notifications are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, BridgeError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let mut json = serde_json::to_string(&req).map_err(|e| BridgeError::TransportError {
            reason: format!("failed to serialize request: {e}"),
        })?;
        json.push('\n');

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes, &json).await?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = pipes
                .stdout
                .read_line(&mut line_buf)
                .await
                .map_err(|e| BridgeError::TransportError {
                    reason: format!("failed to read from stdout: {e}"),
                })?;

            if bytes_read == 0 {
                return Err(BridgeError::TransportError {
                    reason: format!(
                        "server stdout closed (process may have exited){}",
                        format_stderr_suffix(&self.stderr_tail())
                    ),
                });
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Ok(message) = serde_json::from_str::<JsonRpcMessage>(trimmed) else {
                // Plain log output on stdout
                tracing::trace!(line = %trimmed, "skipping non-JSON-RPC line");
                continue;
            };

            match message.classify() {
                Incoming::Response(resp) if resp.id == id => return Ok(resp),
                // Late response to a request that timed out earlier
                Incoming::Response(resp) => {
                    tracing::debug!(expected = id, got = resp.id, "skipping stale response");
                }
                Incoming::Request {
                    id: request_id,
                    method,
                } => answer_provider_request(&mut pipes, request_id, &method).await?,
                Incoming::Notification { method } => {
                    tracing::trace!(%method, "skipping provider notification");
                }
                Incoming::Unrecognized => {
                    tracing::trace!(line = %trimmed, "skipping unrecognized message");
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), BridgeError> {
        let notification = JsonRpcNotification::new(method, params);

        let mut json =
            serde_json::to_string(&notification).map_err(|e| BridgeError::TransportError {
                reason: format!("failed to serialize notification: {e}"),
            })?;
        json.push('\n');

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes, &json).await
    }

    /// Whether the child process has already exited.
    pub fn has_exited(&self) -> bool {
        match self.child.try_lock() {
            Ok(mut child) => !matches!(child.try_wait(), Ok(None)),
            // Locked by `close`, which is waiting for it to exit
            Err(_) => self.closed.load(Ordering::SeqCst),
        }
    }

    /// Recent stderr output of the provider, oldest line first.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Close stdin, give the provider a grace period to exit, then kill it.
    ///
    /// Idempotent: a second call is a no-op.
    pub async fn close(&self) -> Result<(), BridgeError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Dropping stdin sends EOF; stdio servers exit on it.
        match tokio::time::timeout(CLOSE_GRACE, self.pipes.lock()).await {
            Ok(mut pipes) => {
                pipes.stdin.take();
            }
            Err(_) => tracing::debug!("transport busy, skipping stdin close"),
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(command = %self.command, %status, "tool provider exited");
                Ok(())
            }
            _ => {
                tracing::debug!(command = %self.command, "tool provider did not exit, killing");
                child.kill().await.map_err(|e| BridgeError::TransportError {
                    reason: format!("failed to kill tool provider: {e}"),
                })
            }
        }
    }
}

async fn write_line(pipes: &mut Pipes, json: &str) -> Result<(), BridgeError> {
    let stdin = pipes.stdin.as_mut().ok_or_else(|| BridgeError::TransportError {
        reason: "transport closed".into(),
    })?;
    stdin
        .write_all(json.as_bytes())
        .await
        .map_err(|e| BridgeError::TransportError {
            reason: format!("failed to write to stdin: {e}"),
        })?;
    stdin.flush().await.map_err(|e| BridgeError::TransportError {
        reason: format!("failed to flush stdin: {e}"),
    })
}

/// Reply to a provider-initiated request: `ping` gets an empty result,
/// anything else is refused with `METHOD_NOT_FOUND`.
async fn answer_provider_request(
    pipes: &mut Pipes,
    id: serde_json::Value,
    method: &str,
) -> Result<(), BridgeError> {
    let reply = if method == "ping" {
        JsonRpcReply::result(id, serde_json::json!({}))
    } else {
        tracing::debug!(%method, "refusing unsupported provider request");
        JsonRpcReply::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("method not supported by client: {method}"),
        )
    };

    let mut json = serde_json::to_string(&reply).map_err(|e| BridgeError::TransportError {
        reason: format!("failed to serialize reply: {e}"),
    })?;
    json.push('\n');
    write_line(pipes, &json).await
}

/// Forward provider stderr to the log, keeping the last few lines.
fn forward_stderr(stderr: ChildStderr, tail: Arc<parking_lot::Mutex<VecDeque<String>>>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::warn!(stderr = %line, "tool provider stderr");
            push_tail(&tail, line);
        }
    });
}

fn push_tail(tail: &parking_lot::Mutex<VecDeque<String>>, line: String) {
    let mut tail = tail.lock();
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

/// Format a stderr suffix for error messages (empty string if no stderr).
pub fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `BridgeError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, BridgeError> {
    if let Some(err) = response.error {
        return Err(BridgeError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(BridgeError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::JsonRpcError;

    #[test]
    fn test_next_request_id_is_monotonic() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_extract_result_success() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: Some(serde_json::json!({"tools": []})),
            error: None,
        };
        let result = extract_result(resp).unwrap();
        assert!(result["tools"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_extract_result_error() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        match extract_result(resp).unwrap_err() {
            BridgeError::ServerError { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: None,
        };
        let err = extract_result(resp).unwrap_err();
        assert!(matches!(err, BridgeError::ServerError { .. }));
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let tail = parking_lot::Mutex::new(VecDeque::new());
        for i in 0..(STDERR_TAIL_LINES + 5) {
            push_tail(&tail, format!("line {i}"));
        }
        let tail = tail.lock();
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 5"));
    }

    #[test]
    fn test_format_stderr_suffix() {
        assert_eq!(format_stderr_suffix(""), "");
        assert_eq!(format_stderr_suffix("  \n"), "");
        assert_eq!(format_stderr_suffix("boom\n"), " | stderr: boom");
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let config = TransportConfig {
            command: "/nonexistent/toolbridge-provider".into(),
            ..TransportConfig::default()
        };
        let err = StdioTransport::spawn(&config).err().unwrap();
        assert!(matches!(err, BridgeError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_provider_ping_is_answered_before_response() {
        // Sends a ping reusing our request id, then reports whether it got a pong
        let script = r#"
            read -r req
            id=$(printf '%s' "$req" | sed 's/.*"id":\([0-9]*\).*/\1/')
            echo 'provider booting'
            printf '{"jsonrpc":"2.0","method":"notifications/message","params":{}}\n'
            printf '{"jsonrpc":"2.0","id":%s,"method":"ping"}\n' "$id"
            read -r reply
            case "$reply" in
                *'"result":{}'*) answer=pong ;;
                *) answer=none ;;
            esac
            printf '{"jsonrpc":"2.0","id":%s,"result":{"answer":"%s"}}\n' "$id" "$answer"
            read -r eof
        "#;
        let config = TransportConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            keep_alive: false,
            ..TransportConfig::default()
        };
        let transport = StdioTransport::spawn(&config).unwrap();

        let response = transport.request("tools/list", None).await.unwrap();
        let result = extract_result(response).unwrap();
        assert_eq!(result["answer"], "pong");
        transport.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_against_exited_process_reports_transport_error() {
        let config = TransportConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "echo fatal: jar not found >&2; exit 1".into()],
            ..TransportConfig::default()
        };
        let transport = StdioTransport::spawn(&config).unwrap();
        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::TransportError { .. }));
        transport.close().await.unwrap();
        assert!(transport.has_exited());
    }
}

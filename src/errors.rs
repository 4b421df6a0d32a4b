//! Bridge error types.
//!
//! Every variant carries plain string context so the enum is `Clone`: a single
//! failed initialization is handed to every caller that was waiting on it.
//! Structured logging is the caller's responsibility.

use thiserror::Error;

/// Errors that can occur while connecting to or talking with the tool provider.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The tool-provider process failed to start.
    #[error("failed to spawn tool provider '{command}': {reason}")]
    SpawnFailed {
        command: String,
        reason: String,
    },

    /// The MCP initialization handshake failed.
    #[error("tool provider initialization failed: {reason}")]
    InitFailed {
        reason: String,
    },

    /// A request did not complete within its deadline.
    #[error("'{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// JSON-RPC communication error (malformed message, I/O error).
    #[error("transport error: {reason}")]
    TransportError {
        reason: String,
    },

    /// The provider returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not present in the cached tool set.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// Tool call arguments failed the structural schema check.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        reason: String,
    },

    /// The provider process went away while a request was outstanding.
    #[error("tool provider crashed: {reason}")]
    ServerCrashed {
        reason: String,
    },

    /// Configuration error (unreadable or malformed config file).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },

    /// Initialization settled without producing a connection handle.
    #[error("tool provider is not connected")]
    NotConnected,

    /// The bridge was cleaned up while the operation was in flight.
    #[error("bridge is shutting down")]
    ShutdownInProgress,
}

impl BridgeError {
    /// Whether the failure means the underlying process is unusable.
    ///
    /// Used by the session to flag the connection so the next health check
    /// (or request) rebuilds it.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            BridgeError::TransportError { .. } | BridgeError::ServerCrashed { .. }
        )
    }
}

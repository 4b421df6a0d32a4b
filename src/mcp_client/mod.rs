//! MCP Client: JSON-RPC over stdio transport for the tool provider.
//!
//! This module handles:
//! - Spawning the provider child process and owning its pipes
//! - JSON-RPC 2.0 communication over process stdio
//! - The MCP handshake, tool discovery, and tool calls
//! - The invokable tool set handed to request handlers
//!
//! The bridge only sees the [`Connector`] / [`ToolSession`] seam.

pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use session::{Connector, McpSession, StdioConnector, ToolSession};
pub use tools::{Tool, ToolSet};
pub use types::{ServerInfo, ToolCallResult, ToolDefinition};

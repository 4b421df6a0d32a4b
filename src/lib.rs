//! Toolbridge: a shared, self-healing connection to an MCP tool provider.
//!
//! One [`bridge::ToolBridge`] per process owns the provider child process,
//! caches its tools, probes it periodically, reconnects within a retry
//! budget, and is torn down by the [`bridge::LifecycleManager`] on shutdown.

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod logging;
pub mod mcp_client;

#[cfg(test)]
mod test_support;

pub use bridge::{LifecycleManager, ToolBridge};
pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use mcp_client::{Tool, ToolSet};

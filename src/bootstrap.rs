//! Startup hook: connect to the tool provider before the first request.

use anyhow::Context;

use crate::bridge::status::DebugInfo;
use crate::bridge::ToolBridge;

/// What [`eager_initialize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EagerInit {
    /// The bridge was already connected or connecting (hot reload).
    Skipped,
    Connected { tools: usize },
    /// The provider was unavailable; the first request will retry.
    Deferred,
}

/// Connect once at startup. Never fails: an unavailable provider is logged
/// and left for the request path to retry.
pub async fn eager_initialize(bridge: &ToolBridge) -> EagerInit {
    if bridge.get_connection_status().is_connected || bridge.is_initializing() {
        tracing::debug!("tool bridge already initialized; eager startup skipped");
        return EagerInit::Skipped;
    }

    tracing::info!("starting eager tool provider initialization");
    match bridge.get_tools().await {
        Ok(tools) => {
            let status = bridge.get_connection_status();
            tracing::info!(
                tools = tools.len(),
                connected = status.is_connected,
                uptime_ms = status.uptime_ms,
                attempts = status.connection_attempts,
                "tool provider initialized on startup"
            );
            EagerInit::Connected { tools: tools.len() }
        }
        Err(e) => {
            tracing::error!(error = %e, "tool provider initialization failed on startup");
            tracing::warn!("continuing without tools; they will be retried on the first request");
            EagerInit::Deferred
        }
    }
}

/// Log the bridge state once startup is done.
///
/// Reads a snapshot only; it never contacts the provider.
pub fn log_ready(bridge: &ToolBridge) -> anyhow::Result<DebugInfo> {
    let debug = bridge.get_debug_info();
    let status = serde_json::to_string(&debug).context("serializing debug info")?;
    tracing::info!(
        status = %status,
        "tool bridge ready"
    );
    Ok(debug)
}

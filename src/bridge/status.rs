//! Read-only introspection: connection status, debug info, and the
//! operational status report served to administrators.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

use super::singleton::ToolBridge;
use crate::config::RuntimeMode;
use crate::errors::BridgeError;

// ─── Snapshot Types ──────────────────────────────────────────────────────────

/// Point-in-time view of the connection handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub last_health_check: Option<DateTime<Utc>>,
    /// Lifetime reconnect-attempt counter.
    pub connection_attempts: u32,
    /// Milliseconds since the last successful health check (0 when none).
    pub uptime_ms: u64,
}

/// Whether the periodic health check is running, and how often.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckStatus {
    pub is_active: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub instance_id: String,
    /// A connection handle is currently held.
    pub has_instance: bool,
    pub is_initializing: bool,
    pub connection_status: ConnectionStatus,
    pub health_check_status: HealthCheckStatus,
}

// ─── Status Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub singleton: SingletonSummary,
    pub connection: ConnectionSummary,
    pub tools: ToolsAvailability,
    pub system: SystemSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingletonSummary {
    pub initialized: bool,
    pub initializing: bool,
    pub health_check_active: bool,
    pub health_check_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    #[serde(flatten)]
    pub status: ConnectionStatus,
    pub uptime_formatted: String,
}

/// Tool names when the provider answered, otherwise the failure message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolsAvailability {
    Available {
        available: bool,
        count: usize,
        names: Vec<String>,
    },
    Unavailable {
        available: bool,
        error: String,
    },
}

impl ToolsAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, ToolsAvailability::Available { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSummary {
    pub mode: RuntimeMode,
    pub pid: u32,
    pub process_uptime_secs: u64,
    pub memory_bytes: u64,
    pub virtual_memory_bytes: u64,
}

/// `"<seconds>s"`, or `"N/A"` when there is no uptime yet.
pub fn format_uptime(uptime_ms: u64) -> String {
    if uptime_ms > 0 {
        format!("{}s", uptime_ms / 1_000)
    } else {
        "N/A".to_string()
    }
}

/// Collect the operational status report.
///
/// Tries `get_tools()`, so a disconnected bridge attempts to initialize.
/// Tool failures are reported in the body rather than returned.
pub async fn status_report(bridge: &ToolBridge) -> StatusReport {
    tracing::info!("status report requested");

    let tools = match bridge.get_tools().await {
        Ok(tools) => ToolsAvailability::Available {
            available: true,
            count: tools.len(),
            names: tools.names().into_iter().map(str::to_string).collect(),
        },
        Err(e) => ToolsAvailability::Unavailable {
            available: false,
            error: e.to_string(),
        },
    };

    let debug = bridge.get_debug_info();
    let status = bridge.get_connection_status();

    tracing::info!(
        connected = status.is_connected,
        tools_available = tools.is_available(),
        "status report collected"
    );

    StatusReport {
        timestamp: Utc::now(),
        singleton: SingletonSummary {
            initialized: debug.has_instance,
            initializing: debug.is_initializing,
            health_check_active: debug.health_check_status.is_active,
            health_check_interval_ms: debug.health_check_status.interval_ms,
        },
        connection: ConnectionSummary {
            uptime_formatted: format_uptime(status.uptime_ms),
            status,
        },
        tools,
        system: system_summary(bridge.mode()),
    }
}

fn system_summary(mode: RuntimeMode) -> SystemSummary {
    let pid = std::process::id();
    let current = sysinfo::get_current_pid().ok();
    let mut sys = System::new();
    if let Some(current) = current {
        sys.refresh_processes(ProcessesToUpdate::Some(&[current]), true);
    }
    let process = current.and_then(|current| sys.process(current));

    SystemSummary {
        mode,
        pid,
        process_uptime_secs: process.map(|p| p.run_time()).unwrap_or(0),
        memory_bytes: process.map(|p| p.memory()).unwrap_or(0),
        virtual_memory_bytes: process.map(|p| p.virtual_memory()).unwrap_or(0),
    }
}

// ─── Administrative Reconnect ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<ConnectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Force a reconnect and report the outcome.
pub async fn reset_connection(bridge: &ToolBridge) -> ResetOutcome {
    tracing::info!("connection reset requested");

    match bridge.reconnect().await {
        Ok(()) => {
            let status = bridge.get_connection_status();
            tracing::info!(attempts = status.connection_attempts, "connection reset completed");
            ResetOutcome {
                success: true,
                message: "tool provider connection reset".to_string(),
                connection_status: Some(status),
                details: None,
                timestamp: Utc::now(),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "connection reset failed");
            reset_failure(&e)
        }
    }
}

fn reset_failure(error: &BridgeError) -> ResetOutcome {
    ResetOutcome {
        success: false,
        message: "failed to reset tool provider connection".to_string(),
        connection_status: None,
        details: Some(error.to_string()),
        timestamp: Utc::now(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Connection manager: periodic health checks and bounded reconnection.
//!
//! The manager never owns the connection. It holds a weak reference to a
//! [`MonitoredConnection`] and stops on its own once that connection is gone.

use std::sync::Weak;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::lifecycle::LifecycleManager;
use super::status::{ConnectionStatus, HealthCheckStatus};
use crate::config::ConnectionPolicy;
use crate::errors::BridgeError;

/// What the connection manager needs from the connection it watches.
#[async_trait]
pub trait MonitoredConnection: Send + Sync + 'static {
    /// Probe the live connection; `false` when unhealthy or absent.
    async fn health_check(&self) -> bool;

    /// Tear down and rebuild the connection.
    async fn reconnect(&self) -> Result<(), BridgeError>;

    fn connection_status(&self) -> ConnectionStatus;
}

// ─── ConnectionManager ───────────────────────────────────────────────────────

pub struct ConnectionManager {
    policy: ConnectionPolicy,
    task: Mutex<Option<AbortHandle>>,
}

impl ConnectionManager {
    pub fn new(policy: ConnectionPolicy) -> Self {
        Self {
            policy,
            task: Mutex::new(None),
        }
    }

    /// (Re)start the periodic health check against `target`.
    ///
    /// Any running timer is stopped first. The first tick fires one interval
    /// after start; a slow probe delays the following ticks.
    pub fn start_health_check(&self, target: Weak<dyn MonitoredConnection>) {
        self.stop_health_check();

        let period = self.policy.health_check_interval();
        if period.is_zero() {
            tracing::warn!("health_check_interval_ms is 0; health checks disabled");
            return;
        }

        let policy = self.policy.clone();
        let task = LifecycleManager::spawn_supervised("health-check", async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(connection) = target.upgrade() else {
                    tracing::debug!("monitored connection dropped; health checks stopped");
                    break;
                };

                if connection.health_check().await {
                    continue;
                }
                tracing::warn!("health check failed");
                attempt_reconnection(&policy, connection.as_ref()).await;
            }
            Ok(())
        });

        *self.task.lock() = Some(task.abort_handle());
        tracing::debug!(interval_ms = self.policy.health_check_interval_ms, "health check started");
    }

    /// Cancel the periodic health check. Safe when not running.
    pub fn stop_health_check(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::debug!("health check stopped");
        }
    }

    /// Reconnect after the configured delay, unless the retry ceiling is reached.
    pub async fn attempt_reconnection(&self, connection: &dyn MonitoredConnection) -> bool {
        attempt_reconnection(&self.policy, connection).await
    }

    pub fn get_health_check_status(&self) -> HealthCheckStatus {
        HealthCheckStatus {
            is_active: self.task.lock().as_ref().is_some_and(|task| !task.is_finished()),
            interval_ms: self.policy.health_check_interval_ms,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_health_check();
    }
}

async fn attempt_reconnection(
    policy: &ConnectionPolicy,
    connection: &dyn MonitoredConnection,
) -> bool {
    let attempts = connection.connection_status().connection_attempts;
    if attempts >= policy.max_reconnect_attempts {
        tracing::error!(
            attempts,
            max_attempts = policy.max_reconnect_attempts,
            "reconnection attempts exhausted; waiting for the next request to retry"
        );
        return false;
    }

    tracing::info!(
        attempt = attempts + 1,
        max_attempts = policy.max_reconnect_attempts,
        delay_ms = policy.reconnect_delay_ms,
        "scheduling reconnection"
    );
    tokio::time::sleep(policy.reconnect_delay()).await;

    match connection.reconnect().await {
        Ok(()) => {
            tracing::info!("reconnection succeeded");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "reconnection failed");
            false
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

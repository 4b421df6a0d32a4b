//! Tool bridge: the single long-lived connection to the tool provider.
//!
//! Request handlers call [`ToolBridge::get_tools`]; the first call spawns the
//! provider and performs the handshake, later calls read the cached tool set.
//! Concurrent first calls share one in-flight initialization. A background
//! health check (see [`super::health`]) probes the same connection and
//! rebuilds it when it goes stale.
//!
//! ```text
//! UNINITIALIZED ──get_tools──► INITIALIZING ──ok──► CONNECTED
//!                                   │                   │ probe failure / reconnect
//!                                   └──err──► FAILED ◄──┘ (next get_tools retries)
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::health::{ConnectionManager, MonitoredConnection};
use super::lifecycle::LifecycleManager;
use super::status::{ConnectionStatus, DebugInfo};
use crate::config::{BridgeConfig, ConnectionPolicy, RuntimeMode};
use crate::errors::BridgeError;
use crate::mcp_client::{Connector, StdioConnector, ToolDefinition, ToolSession, ToolSet};

type SharedInit = Shared<BoxFuture<'static, Result<(), BridgeError>>>;

static INSTANCE: OnceLock<Arc<ToolBridge>> = OnceLock::new();

/// A live connection: session plus the tools it advertised.
struct ConnectionHandle {
    session: Arc<dyn ToolSession>,
    tools: ToolSet,
    is_connected: bool,
    last_health_check: Option<DateTime<Utc>>,
}

struct InFlightInit {
    generation: u64,
    outcome: SharedInit,
    abort: AbortHandle,
}

// ─── ToolBridge ──────────────────────────────────────────────────────────────

pub struct ToolBridge {
    instance_id: Uuid,
    mode: RuntimeMode,
    connector: Arc<dyn Connector>,
    monitor: ConnectionManager,
    handle: RwLock<Option<ConnectionHandle>>,
    /// Lifetime reconnect counter; survives handle replacement.
    connection_attempts: AtomicU32,
    in_flight: Mutex<Option<InFlightInit>>,
    next_generation: AtomicU64,
    weak_self: Weak<ToolBridge>,
}

impl ToolBridge {
    pub fn new(connector: Arc<dyn Connector>, policy: ConnectionPolicy) -> Arc<Self> {
        Self::with_mode(connector, policy, RuntimeMode::default())
    }

    pub fn with_mode(
        connector: Arc<dyn Connector>,
        policy: ConnectionPolicy,
        mode: RuntimeMode,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            instance_id: Uuid::new_v4(),
            mode,
            connector,
            monitor: ConnectionManager::new(policy),
            handle: RwLock::new(None),
            connection_attempts: AtomicU32::new(0),
            in_flight: Mutex::new(None),
            next_generation: AtomicU64::new(0),
            weak_self: weak_self.clone(),
        })
    }

    /// The process-wide bridge, built from [`BridgeConfig::global`].
    ///
    /// The first call installs the process signal handlers and registers the
    /// bridge's cleanup with [`LifecycleManager::global`].
    pub fn get_instance() -> Arc<ToolBridge> {
        Arc::clone(INSTANCE.get_or_init(|| {
            let config = BridgeConfig::global();
            let connector = StdioConnector::new(config.transport.clone(), &config.connection);
            let bridge =
                ToolBridge::with_mode(Arc::new(connector), config.connection.clone(), config.mode);

            let lifecycle = LifecycleManager::global();
            lifecycle.setup_process_handlers();
            bridge.register_cleanup(&lifecycle);

            tracing::info!(
                instance_id = %bridge.instance_id,
                command = %config.transport.command,
                "tool bridge instance created"
            );
            bridge
        }))
    }

    /// Whether the process-wide instance has been created.
    pub fn instance_exists() -> bool {
        INSTANCE.get().is_some()
    }

    /// Tear the connection down when `lifecycle` shuts the process down.
    pub fn register_cleanup(&self, lifecycle: &LifecycleManager) {
        let bridge = self.weak_self.clone();
        lifecycle.register_cleanup_handler(move || {
            let bridge = bridge.clone();
            async move {
                if let Some(bridge) = bridge.upgrade() {
                    bridge.cleanup().await;
                }
                Ok(())
            }
        });
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    /// The live client session, connecting first if needed.
    pub async fn get_client(&self) -> Result<Arc<dyn ToolSession>, BridgeError> {
        self.ensure_initialized().await.map(|(session, _)| session)
    }

    /// The cached tool set, connecting first if needed.
    pub async fn get_tools(&self) -> Result<ToolSet, BridgeError> {
        self.ensure_initialized().await.map(|(_, tools)| tools)
    }

    async fn ensure_initialized(&self) -> Result<(Arc<dyn ToolSession>, ToolSet), BridgeError> {
        if let Some(ready) = self.connected_snapshot() {
            return Ok(ready);
        }

        self.initialization().await?;

        let handle = self.handle.read();
        handle
            .as_ref()
            .map(|h| (Arc::clone(&h.session), h.tools.clone()))
            .ok_or(BridgeError::NotConnected)
    }

    fn connected_snapshot(&self) -> Option<(Arc<dyn ToolSession>, ToolSet)> {
        let handle = self.handle.read();
        handle
            .as_ref()
            .filter(|h| h.is_connected)
            .map(|h| (Arc::clone(&h.session), h.tools.clone()))
    }

    // ─── Initialization ──────────────────────────────────────────────────

    /// Join the in-flight initialization, or start one.
    ///
    /// The work runs in its own task, so a caller that gives up waiting does
    /// not cancel it for the others.
    fn initialization(&self) -> SharedInit {
        let mut slot = self.in_flight.lock();
        if let Some(flight) = slot.as_ref() {
            tracing::debug!("joining in-flight initialization");
            return flight.outcome.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let bridge = self.weak_self.clone();
        let task = tokio::spawn(async move {
            let Some(bridge) = bridge.upgrade() else {
                return Err(BridgeError::ShutdownInProgress);
            };
            let outcome = bridge.initialize().await;
            bridge.finish_initialization(generation);
            outcome
        });
        let abort = task.abort_handle();

        let bridge = self.weak_self.clone();
        let outcome = async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(BridgeError::ShutdownInProgress),
                Err(e) => Err(BridgeError::InitFailed {
                    reason: format!("initialization task panicked: {e}"),
                }),
            };
            if let Some(bridge) = bridge.upgrade() {
                bridge.finish_initialization(generation);
            }
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(InFlightInit {
            generation,
            outcome: outcome.clone(),
            abort,
        });
        outcome
    }

    fn finish_initialization(&self, generation: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.generation == generation) {
            *slot = None;
        }
    }

    /// Tear down any stale handle, connect, list tools, publish a new handle.
    async fn initialize(&self) -> Result<(), BridgeError> {
        let stale = self.handle.write().take();
        if let Some(stale) = stale {
            tracing::debug!("discarding stale connection handle");
            close_session(stale.session.as_ref()).await;
        }

        tracing::info!(attempts = self.attempts(), "connecting to tool provider");
        let session = self.connector.connect().await?;
        let definitions = match session.list_tools().await {
            Ok(definitions) => definitions,
            Err(e) => {
                close_session(session.as_ref()).await;
                return Err(e);
            }
        };

        let tools = ToolSet::new(definitions, Arc::clone(&session));
        let count = tools.len();
        *self.handle.write() = Some(ConnectionHandle {
            session,
            tools,
            is_connected: true,
            last_health_check: Some(Utc::now()),
        });

        let target: Weak<dyn MonitoredConnection> = self.weak_self.clone();
        self.monitor.start_health_check(target);

        tracing::info!(tools = count, "tool provider connected");
        Ok(())
    }

    // ─── Health & Reconnect ──────────────────────────────────────────────

    /// Probe the connection by re-listing tools through the existing session.
    ///
    /// Returns `false` without side effects when there is no connection.
    pub async fn health_check(&self) -> bool {
        let session = match self.handle.read().as_ref() {
            Some(handle) => Arc::clone(&handle.session),
            None => return false,
        };

        let probe = session.list_tools().await;

        let mut guard = self.handle.write();
        let Some(handle) = guard
            .as_mut()
            .filter(|h| Arc::ptr_eq(&h.session, &session))
        else {
            tracing::debug!("connection replaced during health check; result discarded");
            return true;
        };

        match probe {
            Ok(definitions) => {
                handle.is_connected = true;
                handle.last_health_check = Some(Utc::now());
                if tools_changed(&handle.tools, &definitions) {
                    tracing::info!(tools = definitions.len(), "tool set changed; cache refreshed");
                    handle.tools = ToolSet::new(definitions, session);
                }
                tracing::debug!("health check passed");
                true
            }
            Err(e) => {
                handle.is_connected = false;
                drop(guard);
                let attempts = self.connection_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(error = %e, attempts, "health check failed");
                false
            }
        }
    }

    /// Discard the current connection and build a new one.
    ///
    /// Counts as a reconnect attempt unless a failed health check already
    /// counted this incident. Errors from closing the old session are ignored.
    pub async fn reconnect(&self) -> Result<(), BridgeError> {
        let already_counted = self
            .handle
            .read()
            .as_ref()
            .is_some_and(|h| !h.is_connected);
        if !already_counted {
            self.connection_attempts.fetch_add(1, Ordering::SeqCst);
        }
        tracing::info!(attempts = self.attempts(), "reconnecting to tool provider");

        let stale = self.handle.write().take();
        if let Some(stale) = stale {
            close_session(stale.session.as_ref()).await;
        }

        self.initialization().await
    }

    // ─── Introspection ───────────────────────────────────────────────────

    /// Current connection state. Never performs I/O.
    pub fn get_connection_status(&self) -> ConnectionStatus {
        let attempts = self.attempts();
        let handle = self.handle.read();
        match handle.as_ref() {
            Some(h) => ConnectionStatus {
                is_connected: h.is_connected,
                last_health_check: h.last_health_check,
                connection_attempts: attempts,
                uptime_ms: h
                    .last_health_check
                    .map(|at| (Utc::now() - at).num_milliseconds().max(0) as u64)
                    .unwrap_or(0),
            },
            None => ConnectionStatus {
                connection_attempts: attempts,
                ..ConnectionStatus::default()
            },
        }
    }

    pub fn get_debug_info(&self) -> DebugInfo {
        DebugInfo {
            instance_id: self.instance_id.to_string(),
            has_instance: self.handle.read().is_some(),
            is_initializing: self.is_initializing(),
            connection_status: self.get_connection_status(),
            health_check_status: self.monitor.get_health_check_status(),
        }
    }

    pub fn is_initializing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    fn attempts(&self) -> u32 {
        self.connection_attempts.load(Ordering::SeqCst)
    }

    // ─── Cleanup ─────────────────────────────────────────────────────────

    /// Stop health checks, abort any initialization, close the session.
    ///
    /// Idempotent. The bridge stays usable: a later `get_tools()` reconnects.
    pub async fn cleanup(&self) {
        let flight = self.in_flight.lock().take();
        if let Some(flight) = flight {
            flight.abort.abort();
            tracing::debug!("in-flight initialization aborted");
        }

        let handle = self.handle.write().take();
        self.monitor.stop_health_check();

        if let Some(handle) = handle {
            close_session(handle.session.as_ref()).await;
            tracing::info!("tool provider connection closed");
        }
    }
}

#[async_trait]
impl MonitoredConnection for ToolBridge {
    async fn health_check(&self) -> bool {
        ToolBridge::health_check(self).await
    }

    async fn reconnect(&self) -> Result<(), BridgeError> {
        ToolBridge::reconnect(self).await
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.get_connection_status()
    }
}

async fn close_session(session: &dyn ToolSession) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "error closing tool provider session");
    }
}

fn tools_changed(current: &ToolSet, definitions: &[ToolDefinition]) -> bool {
    current.len() != definitions.len()
        || definitions
            .iter()
            .any(|d| current.get(&d.name).map(|t| t.definition()) != Some(d))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::future::join_all;
    use tokio::time::Instant;

    use crate::test_support::{tool, FakeConnector};

    fn policy(max_attempts: u32, delay_ms: u64, interval_ms: u64) -> ConnectionPolicy {
        ConnectionPolicy {
            max_reconnect_attempts: max_attempts,
            reconnect_delay_ms: delay_ms,
            health_check_interval_ms: interval_ms,
            ..ConnectionPolicy::default()
        }
    }

    fn bridge_with(connector: &Arc<FakeConnector>, policy: ConnectionPolicy) -> Arc<ToolBridge> {
        ToolBridge::new(connector.clone(), policy)
    }

    fn fake(names: &[&str]) -> Arc<FakeConnector> {
        Arc::new(FakeConnector::new(names.iter().map(|n| tool(n)).collect()))
    }

    #[tokio::test]
    async fn test_get_instance_returns_same_bridge() {
        let _ = BridgeConfig::install(BridgeConfig {
            mode: RuntimeMode::Development,
            ..BridgeConfig::default()
        });

        let first = ToolBridge::get_instance();
        let second = ToolBridge::get_instance();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(ToolBridge::instance_exists());
        assert!(!first.get_debug_info().has_instance);
        assert_eq!(first.get_debug_info().instance_id, second.instance_id().to_string());
    }

    #[tokio::test]
    async fn test_status_before_init() {
        let bridge = bridge_with(&fake(&["plan"]), ConnectionPolicy::default());

        assert_eq!(bridge.get_connection_status(), ConnectionStatus::default());
        let debug = bridge.get_debug_info();
        assert!(!debug.is_initializing);
        assert!(!debug.health_check_status.is_active);
        assert_eq!(debug.health_check_status.interval_ms, 30_000);
    }

    #[tokio::test]
    async fn test_has_instance_tracks_connection_handle() {
        let bridge = bridge_with(&fake(&["plan"]), ConnectionPolicy::default());
        assert!(!bridge.get_debug_info().has_instance);

        bridge.get_tools().await.unwrap();
        assert!(bridge.get_debug_info().has_instance);

        bridge.cleanup().await;
        assert!(!bridge.get_debug_info().has_instance);
    }

    #[tokio::test]
    async fn test_get_tools_connects_once_then_reads_cache() {
        let connector = fake(&["plan", "chart"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());

        let tools = bridge.get_tools().await.unwrap();
        let again = bridge.get_tools().await.unwrap();
        let client = bridge.get_client().await.unwrap();

        assert_eq!(tools.names(), vec!["chart", "plan"]);
        assert!(tools.same_snapshot(&again));
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connector.last_session().unwrap().list_count(), 1);
        assert!(client.list_tools().await.is_ok());

        let status = bridge.get_connection_status();
        assert!(status.is_connected);
        assert!(status.last_health_check.is_some());
        assert_eq!(status.connection_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_initialization() {
        let connector = Arc::new(
            FakeConnector::new(vec![tool("plan")]).with_handshake_delay(Duration::from_millis(50)),
        );
        let bridge = bridge_with(&connector, ConnectionPolicy::default());

        let start = Instant::now();
        let (a, b) = tokio::join!(bridge.get_tools(), bridge.get_tools());
        let elapsed = start.elapsed();

        assert!(a.unwrap().same_snapshot(&b.unwrap()));
        assert_eq!(connector.connect_count(), 1);
        assert!(elapsed >= Duration::from_millis(50), "took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(100), "took {elapsed:?}");
        assert!(!bridge.is_initializing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let connector = Arc::new(
            FakeConnector::new(vec![tool("plan")]).with_handshake_delay(Duration::from_millis(10)),
        );
        connector.set_connect_failing(true);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());

        let results = join_all((0..5).map(|_| bridge.get_tools())).await;

        assert_eq!(connector.connect_count(), 1);
        let messages: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap_err().to_string())
            .collect();
        assert!(messages.iter().all(|m| m == &messages[0]));
        assert!(messages[0].contains("refused handshake"));
        assert_eq!(bridge.get_connection_status(), ConnectionStatus::default());
    }

    #[tokio::test]
    async fn test_failed_initialization_is_retried_by_next_call() {
        let connector = fake(&["plan"]);
        connector.set_connect_failing(true);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        assert!(bridge.get_tools().await.is_err());

        connector.set_connect_failing(false);
        assert!(bridge.get_tools().await.is_ok());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_health_check_success_refreshes_timestamp() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        bridge.get_tools().await.unwrap();
        let before = bridge.get_connection_status().last_health_check.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(bridge.health_check().await);

        let status = bridge.get_connection_status();
        assert!(status.is_connected);
        assert!(status.last_health_check.unwrap() > before);
        assert_eq!(status.connection_attempts, 0);
    }

    #[tokio::test]
    async fn test_health_check_picks_up_new_tools() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        let first = bridge.get_tools().await.unwrap();

        assert!(bridge.health_check().await);
        assert!(bridge.get_tools().await.unwrap().same_snapshot(&first));

        let session = connector.last_session().unwrap();
        session.set_definitions(vec![tool("plan"), tool("forecast")]);
        assert!(bridge.health_check().await);

        let tools = bridge.get_tools().await.unwrap();
        assert!(tools.contains("forecast"));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_health_check_failure_marks_disconnected() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        bridge.get_tools().await.unwrap();

        connector.set_probes_failing(true);
        assert!(!bridge.health_check().await);

        let status = bridge.get_connection_status();
        assert!(!status.is_connected);
        assert_eq!(status.connection_attempts, 1);
        assert!(!connector.last_session().unwrap().is_closed());

        // Stale cache triggers a fresh initialization on the request path
        connector.set_probes_failing(false);
        bridge.get_tools().await.unwrap();
        assert_eq!(connector.connect_count(), 2);
        assert!(connector.sessions()[0].is_closed());
    }

    #[tokio::test]
    async fn test_health_check_without_connection_is_inert() {
        let bridge = bridge_with(&fake(&["plan"]), ConnectionPolicy::default());
        assert!(!bridge.health_check().await);
        assert_eq!(bridge.get_connection_status(), ConnectionStatus::default());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_handle() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        let before = bridge.get_tools().await.unwrap();
        let old_session = connector.last_session().unwrap();
        old_session.set_close_failing(true);

        bridge.reconnect().await.unwrap();

        assert!(old_session.is_closed());
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(bridge.get_connection_status().connection_attempts, 1);

        let new_session = connector.last_session().unwrap();
        let after = bridge.get_tools().await.unwrap();
        assert!(!after.same_snapshot(&before));
        assert_eq!(new_session.list_count(), 1);
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_failure_propagates() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        bridge.get_tools().await.unwrap();

        connector.set_connect_failing(true);
        let err = bridge.reconnect().await.unwrap_err();

        assert!(matches!(err, BridgeError::InitFailed { .. }));
        assert!(!bridge.get_connection_status().is_connected);
        assert_eq!(bridge.get_connection_status().connection_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failed_probes_trigger_three_reconnects() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, policy(3, 0, 1_000));
        bridge.get_tools().await.unwrap();

        connector.set_probes_failing(true);
        connector.set_connect_failing(true);

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(connector.connect_count(), 4);
        assert_eq!(bridge.get_connection_status().connection_attempts, 3);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(connector.connect_count(), 4);

        // The request path is not gated by the ceiling
        connector.set_connect_failing(false);
        assert!(bridge.get_tools().await.is_ok());
        assert_eq!(connector.connect_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_reconnect_heals_connection() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, policy(3, 100, 1_000));
        bridge.get_tools().await.unwrap();

        connector.last_session().unwrap().set_probes_failing(true);
        tokio::time::sleep(Duration::from_millis(1_200)).await;

        assert_eq!(connector.connect_count(), 2);
        let status = bridge.get_connection_status();
        assert!(status.is_connected);
        assert_eq!(status.connection_attempts, 1);
        assert!(bridge.get_debug_info().health_check_status.is_active);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_not_terminal() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        bridge.get_tools().await.unwrap();

        bridge.cleanup().await;
        bridge.cleanup().await;

        assert!(connector.last_session().unwrap().is_closed());
        assert!(!bridge.get_connection_status().is_connected);
        assert!(!bridge.get_debug_info().health_check_status.is_active);

        bridge.get_tools().await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_aborts_in_flight_initialization() {
        let connector = Arc::new(
            FakeConnector::new(vec![tool("plan")]).with_handshake_delay(Duration::from_secs(5)),
        );
        let bridge = bridge_with(&connector, ConnectionPolicy::default());

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.get_tools().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bridge.is_initializing());

        bridge.cleanup().await;

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::ShutdownInProgress));
        assert!(!bridge.is_initializing());
        assert!(connector.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_shutdown_closes_connection() {
        let connector = fake(&["plan"]);
        let bridge = bridge_with(&connector, ConnectionPolicy::default());
        bridge.get_tools().await.unwrap();

        let lifecycle = LifecycleManager::new(Duration::from_secs(1), RuntimeMode::Development);
        bridge.register_cleanup(&lifecycle);
        lifecycle.graceful_shutdown().await;

        assert!(connector.last_session().unwrap().is_closed());
        assert_eq!(bridge.get_connection_status().uptime_ms, 0);
    }
}

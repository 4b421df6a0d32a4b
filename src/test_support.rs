//! In-memory connector and session used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::BridgeError;
use crate::mcp_client::session::{Connector, ToolSession};
use crate::mcp_client::types::{ToolCallResult, ToolDefinition};

pub fn tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: format!("{name} tool"),
        input_schema: serde_json::json!({"type": "object", "properties": {}}),
    }
}

// ─── FakeSession ─────────────────────────────────────────────────────────────

pub struct FakeSession {
    definitions: Mutex<Vec<ToolDefinition>>,
    fail_probes: AtomicBool,
    fail_close: AtomicBool,
    closed: AtomicBool,
    list_calls: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        Self {
            definitions: Mutex::new(definitions),
            fail_probes: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.lock().clone()
    }

    pub fn set_definitions(&self, definitions: Vec<ToolDefinition>) {
        *self.definitions.lock() = definitions;
    }

    pub fn set_probes_failing(&self, failing: bool) {
        self.fail_probes.store(failing, Ordering::SeqCst);
    }

    pub fn set_close_failing(&self, failing: bool) {
        self.fail_close.store(failing, Ordering::SeqCst);
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BridgeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_probes.load(Ordering::SeqCst) || self.is_closed() {
            return Err(BridgeError::ServerCrashed {
                reason: "provider stopped responding".into(),
            });
        }
        Ok(self.definitions())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, BridgeError> {
        self.calls.lock().push(name.to_string());
        Ok(ToolCallResult {
            tool_name: name.to_string(),
            success: true,
            result: Some(serde_json::json!({
                "content": [{"type": "text", "text": arguments.to_string()}]
            })),
            error: None,
            execution_time_ms: 0,
        })
    }

    async fn close(&self) -> Result<(), BridgeError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(BridgeError::TransportError {
                reason: "broken pipe".into(),
            });
        }
        Ok(())
    }
}

// ─── FakeConnector ───────────────────────────────────────────────────────────

pub struct FakeConnector {
    definitions: Vec<ToolDefinition>,
    handshake_delay: Duration,
    fail_connect: AtomicBool,
    fail_probes: AtomicBool,
    connects: AtomicUsize,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeConnector {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        Self {
            definitions,
            handshake_delay: Duration::ZERO,
            fail_connect: AtomicBool::new(false),
            fail_probes: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_connect_failing(&self, failing: bool) {
        self.fail_connect.store(failing, Ordering::SeqCst);
    }

    /// Make probes fail on every existing and future session.
    pub fn set_probes_failing(&self, failing: bool) {
        self.fail_probes.store(failing, Ordering::SeqCst);
        for session in self.sessions.lock().iter() {
            session.set_probes_failing(failing);
        }
    }

    pub fn last_session(&self) -> Option<Arc<FakeSession>> {
        self.sessions.lock().last().cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn ToolSession>, BridgeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::InitFailed {
                reason: "provider refused handshake".into(),
            });
        }

        let session = Arc::new(FakeSession::new(self.definitions.clone()));
        session.set_probes_failing(self.fail_probes.load(Ordering::SeqCst));
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

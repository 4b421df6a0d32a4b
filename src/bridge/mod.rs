//! Tool bridge: one supervised connection to the tool provider per process.
//!
//! - [`singleton`]: lazy, coalesced initialization and the cached tool set
//! - [`health`]: periodic health checks and bounded reconnection
//! - [`lifecycle`]: cleanup registry and graceful shutdown
//! - [`status`]: status snapshots and the administrative reconnect

pub mod health;
pub mod lifecycle;
pub mod singleton;
pub mod status;

pub use health::{ConnectionManager, MonitoredConnection};
pub use lifecycle::LifecycleManager;
pub use singleton::ToolBridge;
pub use status::{ConnectionStatus, DebugInfo, HealthCheckStatus, StatusReport};

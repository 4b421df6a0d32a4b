//! Bridge configuration loading.
//!
//! Reads a YAML file describing how to launch the tool-provider process, the
//! reconnection policy, logging, and the runtime mode. String values may use
//! `${VAR}` or `${VAR:-default}` interpolation. The configuration is loaded
//! once and is immutable for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TOOLBRIDGE_CONFIG";

/// Environment variable overriding the runtime mode (`development` / `production`).
pub const RUNTIME_MODE_ENV: &str = "TOOLBRIDGE_ENV";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Whether the process runs under hot-reload tooling.
///
/// In development mode a graceful shutdown releases resources but leaves the
/// process running so the surrounding tooling can reload it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    #[default]
    Production,
    Development,
}

impl RuntimeMode {
    /// Read the mode from `TOOLBRIDGE_ENV`, if set to a recognised value.
    pub fn from_env() -> Option<Self> {
        match std::env::var(RUNTIME_MODE_ENV).ok()?.to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(RuntimeMode::Development),
            "production" | "prod" => Some(RuntimeMode::Production),
            _ => None,
        }
    }

    pub fn is_development(self) -> bool {
        self == RuntimeMode::Development
    }
}

/// How to launch the tool-provider process.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Deadline for spawn + handshake, in milliseconds.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// When `false` the child is killed as soon as its handle is dropped;
    /// when `true` it is only stopped by an explicit close (or by the
    /// provider exiting on stdin EOF).
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
}

impl TransportConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command: "mcp-server".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            startup_timeout_ms: default_startup_timeout_ms(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Health-check and reconnection policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionPolicy {
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Per-request deadline once the session is established.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl ConnectionPolicy {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

/// Minimum level for the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Falls back to `debug` in development mode and `info` otherwise.
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
    /// Optional log file; stderr when absent.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Emit one JSON object per event instead of the prefixed text format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            prefix: default_log_prefix(),
            file: None,
            json: false,
        }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Time box for each registered cleanup handler.
    #[serde(default = "default_cleanup_timeout_ms")]
    pub cleanup_timeout_ms: u64,
}

impl LifecycleConfig {
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleanup_timeout_ms: default_cleanup_timeout_ms(),
        }
    }
}

/// Top-level bridge configuration (mirrors `config.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub connection: ConnectionPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub mode: RuntimeMode,
}

impl BridgeConfig {
    /// Effective log level after applying the mode-dependent default.
    pub fn log_level(&self) -> LogLevel {
        self.logging.level.unwrap_or(if self.mode.is_development() {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
    }

    /// The process-wide configuration, loaded on first access.
    ///
    /// Uses the config installed via [`BridgeConfig::install`] if any,
    /// otherwise [`load_from_env`]. A missing or unreadable file falls back to
    /// defaults so that startup never fails on configuration alone.
    pub fn global() -> &'static BridgeConfig {
        GLOBAL_CONFIG.get_or_init(|| match load_from_env() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load bridge config, using defaults");
                apply_env_overrides(BridgeConfig::default())
            }
        })
    }

    /// Install an explicit process-wide configuration.
    ///
    /// Fails if the configuration was already installed or read.
    pub fn install(config: BridgeConfig) -> Result<(), BridgeError> {
        GLOBAL_CONFIG.set(config).map_err(|_| BridgeError::ConfigError {
            reason: "bridge configuration already initialized".into(),
        })
    }
}

static GLOBAL_CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

fn default_startup_timeout_ms() -> u64 {
    30_000
}
fn default_keep_alive() -> bool {
    true
}
fn default_max_reconnect_attempts() -> u32 {
    3
}
fn default_reconnect_delay_ms() -> u64 {
    1_000
}
fn default_health_check_interval_ms() -> u64 {
    30_000
}
fn default_connection_timeout_ms() -> u64 {
    10_000
}
fn default_log_prefix() -> String {
    "[MCP]".to_string()
}
fn default_cleanup_timeout_ms() -> u64 {
    5_000
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve the config file location.
///
/// 1. `TOOLBRIDGE_CONFIG` if set.
/// 2. `<platform config dir>/toolbridge/config.yaml` if it exists.
///
/// Returns `None` when neither applies (defaults are used).
pub fn find_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(expand_tilde(&path)));
    }

    let candidate = dirs::config_dir()?.join("toolbridge").join("config.yaml");
    candidate.exists().then_some(candidate)
}

/// Load the configuration from the resolved path, or defaults if there is none.
pub fn load_from_env() -> Result<BridgeConfig, BridgeError> {
    let config = match find_config_path() {
        Some(path) => load_config(&path)?,
        None => BridgeConfig::default(),
    };
    Ok(apply_env_overrides(config))
}

/// Load and parse a configuration file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, BridgeError> {
    let raw = std::fs::read_to_string(path).map_err(|e| BridgeError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_config(&raw)
}

/// Parse configuration text after env-var interpolation.
pub fn parse_config(raw: &str) -> Result<BridgeConfig, BridgeError> {
    let interpolated = interpolate_env_vars(raw);

    let config: BridgeConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| BridgeError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    if config.transport.command.trim().is_empty() {
        return Err(BridgeError::ConfigError {
            reason: "transport.command must not be empty".into(),
        });
    }

    Ok(config)
}

/// Apply `TOOLBRIDGE_ENV` on top of a loaded configuration.
pub fn apply_env_overrides(mut config: BridgeConfig) -> BridgeConfig {
    if let Some(mode) = RuntimeMode::from_env() {
        config.mode = mode;
    }
    config
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => format!("{}{rest}", home.display()),
            None => path.to_string(),
        },
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Process lifecycle: cleanup registry and graceful shutdown.
//!
//! Components register async cleanup callbacks here. On SIGINT/SIGTERM, or on
//! a panic, every callback runs concurrently, each bounded by the cleanup
//! timeout, and the process then exits with status 0. In development mode the
//! process is left running so hot-reload tooling can restart the module.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{BridgeConfig, RuntimeMode};

/// Zero-argument async cleanup callback.
pub type CleanupHandler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

// ─── LifecycleManager ────────────────────────────────────────────────────────

pub struct LifecycleManager {
    handlers: Mutex<Vec<CleanupHandler>>,
    handlers_installed: AtomicBool,
    shutting_down: AtomicBool,
    cleanup_timeout: Duration,
    mode: RuntimeMode,
    /// Flips to `true` once every cleanup handler has settled.
    shutdown_complete: watch::Sender<bool>,
}

impl LifecycleManager {
    pub fn new(cleanup_timeout: Duration, mode: RuntimeMode) -> Arc<Self> {
        let (shutdown_complete, _) = watch::channel(false);
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
            handlers_installed: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            cleanup_timeout,
            mode,
            shutdown_complete,
        })
    }

    /// The process-wide manager, configured from [`BridgeConfig::global`].
    pub fn global() -> Arc<LifecycleManager> {
        static GLOBAL: OnceLock<Arc<LifecycleManager>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| {
            let config = BridgeConfig::global();
            LifecycleManager::new(config.lifecycle.cleanup_timeout(), config.mode)
        }))
    }

    /// Install signal listeners and the panic hook. Runs at most once.
    ///
    /// Returns `false` when already installed or when called outside a tokio
    /// runtime (nothing is installed in that case and a later call may retry).
    pub fn setup_process_handlers(self: &Arc<Self>) -> bool {
        if self.handlers_installed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let Ok(runtime) = Handle::try_current() else {
            self.handlers_installed.store(false, Ordering::SeqCst);
            tracing::warn!("no tokio runtime; process handlers not installed");
            return false;
        };

        let manager = Arc::clone(self);
        runtime.spawn(async move {
            let signal = wait_for_termination_signal().await;
            tracing::info!(signal, "termination signal received");
            manager.graceful_shutdown().await;
        });

        install_panic_hook(Arc::downgrade(self), runtime);
        tracing::debug!("process handlers installed");
        true
    }

    /// Append a cleanup callback; it runs once during graceful shutdown.
    pub fn register_cleanup_handler<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: CleanupHandler = Arc::new(move || handler().boxed());
        let mut handlers = self.handlers.lock();
        handlers.push(handler);
        tracing::debug!(handlers = handlers.len(), "cleanup handler registered");
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Run every cleanup handler concurrently, then exit (production only).
    ///
    /// Only the first call does anything; later calls return immediately.
    /// Handler failures and timeouts are logged and never stop the others.
    pub async fn graceful_shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("shutdown already in progress");
            return;
        }

        let handlers = self.handlers.lock().clone();
        let timeout = self.cleanup_timeout;
        tracing::info!(
            handlers = handlers.len(),
            timeout_ms = timeout.as_millis() as u64,
            "graceful shutdown started"
        );

        let outcomes = join_all(handlers.iter().enumerate().map(|(index, handler)| {
            let cleanup = handler();
            async move {
                match tokio::time::timeout(timeout, cleanup).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::warn!(handler = index, error = %e, "cleanup handler failed");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(
                            handler = index,
                            timeout_ms = timeout.as_millis() as u64,
                            "cleanup handler timed out"
                        );
                        false
                    }
                }
            }
        }))
        .await;

        let failed = outcomes.iter().filter(|ok| !**ok).count();
        tracing::info!(
            completed = outcomes.len() - failed,
            failed,
            "graceful shutdown complete"
        );
        self.shutdown_complete.send_replace(true);

        if self.mode.is_development() {
            tracing::debug!("development mode; process left running");
        } else {
            std::process::exit(0);
        }
    }

    /// Resolve once a graceful shutdown has run all cleanup handlers.
    pub async fn wait_for_shutdown(&self) {
        let mut done = self.shutdown_complete.subscribe();
        let _ = done.wait_for(|complete| *complete).await;
    }

    /// Forget every handler and re-arm shutdown (tests and hot reload).
    ///
    /// Installed process handlers stay installed.
    pub fn reset(&self) {
        self.handlers.lock().clear();
        self.shutting_down.store(false, Ordering::SeqCst);
        self.shutdown_complete.send_replace(false);
    }

    /// Spawn a detached background task whose failure is logged, never raised.
    pub fn spawn_supervised<F>(name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(task = name, error = %format!("{e:#}"), "background task failed");
            }
        })
    }
}

// ─── Process Hooks ───────────────────────────────────────────────────────────

/// Wait for SIGINT or SIGTERM (ctrl-c only on non-unix platforms).
async fn wait_for_termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                None
            }
        };
        let sigterm_recv = async {
            match sigterm.as_mut() {
                Some(sigterm) => sigterm.recv().await,
                None => std::future::pending::<Option<()>>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm_recv => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}

/// Log panics and start a graceful shutdown, then defer to the previous hook.
fn install_panic_hook(manager: Weak<LifecycleManager>, runtime: Handle) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "uncaught panic");
        if let Some(manager) = manager.upgrade() {
            if !manager.is_shutting_down() {
                runtime.spawn(async move { manager.graceful_shutdown().await });
            }
        }
        previous(info);
    }));
}

// ─── Tests ───────────────────────────────────────────────────────────────────

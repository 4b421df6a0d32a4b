use anyhow::Context;

use toolbridge::bootstrap::{eager_initialize, log_ready};
use toolbridge::config::{self, BridgeConfig};
use toolbridge::{logging, LifecycleManager, ToolBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fall back to defaults on a bad file; the reason is logged once logging is up
    let (config, load_error) = match config::load_from_env() {
        Ok(config) => (config, None),
        Err(e) => (config::apply_env_overrides(BridgeConfig::default()), Some(e)),
    };
    logging::init(&config);
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "failed to load bridge config, using defaults");
    }
    BridgeConfig::install(config).context("installing bridge configuration")?;

    let bridge = ToolBridge::get_instance();
    eager_initialize(&bridge).await;

    log_ready(&bridge)?;

    LifecycleManager::global().wait_for_shutdown().await;
    Ok(())
}

//! Service entrypoint: env-driven configuration, logging, engine lifecycle.

use vidra::core::{config, logging};
use vidra::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logger(&config::LOG_FILE_PATH)?;

    log::info!("Vidra {} starting", env!("CARGO_PKG_VERSION"));
    logging::log_startup_configuration();

    let engine = Engine::from_env()?;
    engine.start().await;
    log::info!("Engine running; press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to listen for shutdown signal: {}", e))?;
    log::info!("Shutdown signal received, stopping");

    engine.stop().await;
    log::info!("Engine stopped cleanly");
    Ok(())
}

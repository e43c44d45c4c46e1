//! Logging initialization and startup diagnostics.

use anyhow::Result;
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;

use crate::core::config;

/// Initialize logger for both console and file output.
///
/// # Arguments
/// * `log_file_path` - Path to the log file
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file =
        File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Log effective configuration at startup so operator mistakes surface
/// immediately instead of as silent no-ops hours later.
pub fn log_startup_configuration() {
    log::info!("database: {}", *config::DATABASE_PATH);
    log::info!("download folder: {}", *config::DOWNLOAD_FOLDER);
    log::info!(
        "download workers: {}, fetch timeout: {}s",
        *config::download::WORKER_POOL_SIZE,
        *config::download::FETCH_TIMEOUT_SECS
    );
    log::info!(
        "source timeout: {}s, min call delay: {}ms, breaker threshold: {}",
        *config::sources::SEARCH_TIMEOUT_SECS,
        *config::sources::MIN_CALL_DELAY_MS,
        *config::sources::MAX_CONSECUTIVE_ERRORS
    );

    if config::sources::YOUTUBE_API_KEY.is_empty() {
        log::warn!("YOUTUBE_API_KEY not set, YouTube discovery disabled");
    }
    if config::sources::IMVDB_APP_KEY.is_empty() {
        log::warn!("IMVDB_APP_KEY not set, IMVDb discovery disabled");
    }
}

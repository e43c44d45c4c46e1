//! Process-level configuration read from environment variables.
//!
//! Each knob is a `Lazy` static read once at first use. These are the
//! operator-facing settings of the process itself (paths, pool sizes,
//! timeouts). Schedule configuration is NOT here: it comes through
//! `settings::SettingsProvider` and is snapshotted per scheduler tick.

use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: vidra.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "vidra.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: vidra.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "vidra.log".to_string()));

/// Destination directory for downloaded media
/// Read from DOWNLOAD_FOLDER environment variable
pub static DOWNLOAD_FOLDER: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "media".to_string()));

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Download pipeline configuration
pub mod download {
    use super::*;

    /// Number of download workers. Kept small: each worker runs one
    /// yt-dlp process and external providers throttle aggressively.
    pub static WORKER_POOL_SIZE: Lazy<usize> = Lazy::new(|| env_u64("WORKER_POOL_SIZE", 3) as usize);

    /// yt-dlp binary, overridable for pinned installs
    pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

    /// Hard cap on one media fetch (seconds)
    pub static FETCH_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_u64("FETCH_TIMEOUT_SECS", 900));

    pub fn fetch_timeout() -> Duration {
        Duration::from_secs(*FETCH_TIMEOUT_SECS)
    }
}

/// Source adapter configuration
pub mod sources {
    use super::*;

    /// Bound on one adapter search call (seconds). A hung adapter fails
    /// with a timeout instead of stalling the discovery run.
    pub static SEARCH_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_u64("SOURCE_TIMEOUT_SECS", 30));

    /// Minimum delay between consecutive calls to the same source (ms)
    pub static MIN_CALL_DELAY_MS: Lazy<u64> = Lazy::new(|| env_u64("SOURCE_MIN_DELAY_MS", 1500));

    /// Consecutive unavailable/rate-limited results before a source is
    /// skipped for the remainder of the current discovery run
    pub static MAX_CONSECUTIVE_ERRORS: Lazy<u32> =
        Lazy::new(|| env_u64("SOURCE_MAX_CONSECUTIVE_ERRORS", 3) as u32);

    /// YouTube Data API key (empty disables the adapter)
    pub static YOUTUBE_API_KEY: Lazy<String> =
        Lazy::new(|| env::var("YOUTUBE_API_KEY").unwrap_or_else(|_| String::new()));

    /// IMVDb app key (empty disables the adapter)
    pub static IMVDB_APP_KEY: Lazy<String> =
        Lazy::new(|| env::var("IMVDB_APP_KEY").unwrap_or_else(|_| String::new()));

    pub fn search_timeout() -> Duration {
        Duration::from_secs(*SEARCH_TIMEOUT_SECS)
    }

    pub fn min_call_delay() -> Duration {
        Duration::from_millis(*MIN_CALL_DELAY_MS)
    }
}

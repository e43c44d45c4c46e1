use thiserror::Error;

/// Failure of a single source adapter call.
///
/// Contained per source: the discovery run skips the offending source for
/// the rest of the run (circuit breaker) and carries on with the others.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or authentication failure reaching the provider.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Provider signalled explicit throttling (e.g. HTTP 429).
    #[error("source rate limited: {0}")]
    RateLimited(String),

    /// The adapter did not answer within the bounded timeout.
    #[error("source timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl SourceError {
    /// True for failures the circuit breaker counts against the source.
    pub fn trips_breaker(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::RateLimited(_))
    }
}

/// Persistence failure.
///
/// Contained per artist during discovery (skip this artist's run) and per
/// sweep step during downloads; never aborts the whole tick.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Failure of one media fetch, classified by the downloader.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transient (network, throttling); the video returns to WANTED.
    #[error("retryable download failure: {0}")]
    Retryable(String),

    /// Permanent (removed, private, unsupported); the video goes to FAILED.
    #[error("terminal download failure: {0}")]
    Terminal(String),
}

/// Failure to produce a `ScheduleConfig` snapshot.
///
/// The only fatal error class: without valid configuration the scheduler
/// cannot decide what to run, so it degrades until a snapshot succeeds.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

impl SettingsError {
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        SettingsError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

//! Per-source pacing and circuit breaking for one discovery run.
//!
//! A `SourceGate` is constructed fresh at the start of every discovery run
//! and dropped at its end: breaker state never leaks across runs, and since
//! artists are processed sequentially there is no cross-artist contention
//! on it.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::core::config;
use crate::core::error::SourceError;
use crate::model::SourceId;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum delay between consecutive calls to the same source.
    pub min_call_delay: Duration,
    /// Consecutive breaker-tripping failures before the source is skipped
    /// for the remainder of the run.
    pub max_consecutive_errors: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_call_delay: config::sources::min_call_delay(),
            max_consecutive_errors: *config::sources::MAX_CONSECUTIVE_ERRORS,
        }
    }
}

#[derive(Debug, Default)]
struct SourceState {
    not_before: Option<Instant>,
    consecutive_errors: u32,
    open: bool,
}

/// Rate limiter and circuit breaker scoped to a single discovery run.
pub struct SourceGate {
    config: GateConfig,
    state: Mutex<HashMap<SourceId, SourceState>>,
}

impl SourceGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the breaker has opened for this source.
    pub async fn is_open(&self, source: &SourceId) -> bool {
        let state = self.state.lock().await;
        state.get(source).map(|s| s.open).unwrap_or(false)
    }

    /// Wait until this source may be called again, then reserve the next
    /// slot. Must be called once per adapter call.
    pub async fn pace(&self, source: &SourceId) {
        let wait = {
            let state = self.state.lock().await;
            state
                .get(source)
                .and_then(|s| s.not_before)
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut state = self.state.lock().await;
        state.entry(source.clone()).or_default().not_before =
            Some(Instant::now() + self.config.min_call_delay);
    }

    /// Record a successful call; resets the consecutive-error count.
    pub async fn record_success(&self, source: &SourceId) {
        let mut state = self.state.lock().await;
        state.entry(source.clone()).or_default().consecutive_errors = 0;
    }

    /// Record a failed call. Only unavailable/rate-limited results count
    /// toward the breaker; a timeout skips the call but does not trip it.
    /// Returns `true` when this failure opened the breaker.
    pub async fn record_failure(&self, source: &SourceId, error: &SourceError) -> bool {
        if !error.trips_breaker() {
            return false;
        }
        let mut state = self.state.lock().await;
        let entry = state.entry(source.clone()).or_default();
        entry.consecutive_errors += 1;
        if !entry.open && entry.consecutive_errors >= self.config.max_consecutive_errors {
            entry.open = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(max_errors: u32, delay_ms: u64) -> SourceGate {
        SourceGate::new(GateConfig {
            min_call_delay: Duration::from_millis(delay_ms),
            max_consecutive_errors: max_errors,
        })
    }

    #[tokio::test]
    async fn pace_enforces_minimum_delay() {
        let gate = gate(3, 50);
        let source = SourceId::new("youtube");

        let start = Instant::now();
        gate.pace(&source).await; // first call is free
        gate.pace(&source).await; // must wait ~50ms
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn pace_does_not_couple_sources() {
        let gate = gate(3, 200);
        gate.pace(&SourceId::new("youtube")).await;

        let start = Instant::now();
        gate.pace(&SourceId::new("imvdb")).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn breaker_opens_after_consecutive_failures() {
        let gate = gate(2, 0);
        let source = SourceId::new("imvdb");
        let err = SourceError::Unavailable("down".into());

        assert!(!gate.record_failure(&source, &err).await);
        assert!(!gate.is_open(&source).await);
        assert!(gate.record_failure(&source, &err).await);
        assert!(gate.is_open(&source).await);
    }

    #[tokio::test]
    async fn success_resets_the_error_streak() {
        let gate = gate(2, 0);
        let source = SourceId::new("imvdb");
        let err = SourceError::RateLimited("429".into());

        gate.record_failure(&source, &err).await;
        gate.record_success(&source).await;
        gate.record_failure(&source, &err).await;
        assert!(!gate.is_open(&source).await, "streak was broken by a success");
    }

    #[tokio::test]
    async fn timeouts_do_not_trip_the_breaker() {
        let gate = gate(1, 0);
        let source = SourceId::new("youtube");
        let err = SourceError::Timeout(Duration::from_secs(30));

        assert!(!gate.record_failure(&source, &err).await);
        assert!(!gate.is_open(&source).await);
    }
}

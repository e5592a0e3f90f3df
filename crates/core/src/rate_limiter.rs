//! Sliding-window request quota shared by every scan worker.
//!
//! The limiter remembers the instant of each admitted call. A call is admitted
//! when fewer than `max_calls` calls fall inside the trailing window; otherwise
//! the caller sleeps until the oldest call ages out (plus a small safety margin)
//! and tries again.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use whale_watch_core::{RateLimiter, RateLimiterConfig};
//!
//! let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::alpaca_basic()));
//! limiter.acquire().await;
//! // ... issue request ...
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Quota parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum calls inside any trailing window.
    pub max_calls: u32,
    /// Length of the trailing window.
    #[serde(with = "duration_millis")]
    pub window: Duration,
    /// Extra wait added once the oldest call ages out.
    #[serde(with = "duration_millis")]
    pub safety_margin: Duration,
    /// Minimum spacing between consecutive calls.
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::alpaca_basic()
    }
}

impl RateLimiterConfig {
    /// Alpaca basic market-data plan: 200 calls/minute, run at 180.
    #[must_use]
    pub fn alpaca_basic() -> Self {
        Self {
            max_calls: 180,
            window: Duration::from_secs(60),
            safety_margin: Duration::from_millis(100),
            min_interval: Duration::ZERO,
        }
    }

    /// Custom quota of `max_calls` per `window`.
    #[must_use]
    pub fn per_window(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            ..Self::alpaca_basic()
        }
    }

    /// Sets the safety margin.
    #[must_use]
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Sets the minimum spacing between calls.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

// =============================================================================
// Limiter
// =============================================================================

/// Thread-safe sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = config.max_calls.max(1) as usize;
        Self {
            config,
            calls: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn max_calls(&self) -> usize {
        self.config.max_calls.max(1) as usize
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Waits until one more call fits in the quota, then records it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock();
                let now = Instant::now();
                self.prune(&mut calls, now);

                let spacing = calls
                    .back()
                    .map(|last| (*last + self.config.min_interval).saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);

                if calls.len() < self.max_calls() && spacing.is_zero() {
                    calls.push_back(now);
                    return;
                }

                if calls.len() >= self.max_calls() {
                    // Non-empty: len >= max_calls >= 1.
                    let oldest = calls.front().copied().unwrap_or(now);
                    (oldest + self.config.window).saturating_duration_since(now)
                        + self.config.safety_margin
                } else {
                    spacing
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Forgets every recorded call. Used after a full upstream cooldown.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    /// Calls recorded in the current trailing window.
    #[must_use]
    pub fn calls_in_window(&self) -> usize {
        let mut calls = self.calls.lock();
        self.prune(&mut calls, Instant::now());
        calls.len()
    }

    /// Calls still available in the current trailing window.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.max_calls().saturating_sub(self.calls_in_window())
    }
}

/// Serde helper for durations written as integer milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_quota_respected(stamps: &[Instant], max_calls: usize, window: Duration) {
        let mut sorted = stamps.to_vec();
        sorted.sort();
        for pair in sorted.windows(max_calls + 1) {
            let span = pair[max_calls].duration_since(pair[0]);
            assert!(
                span >= window,
                "{} calls within {:?} (limit {} per {:?})",
                max_calls + 1,
                span,
                max_calls,
                window
            );
        }
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_calls, 180);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.min_interval, Duration::ZERO);
    }

    #[test]
    fn test_config_builders() {
        let config = RateLimiterConfig::per_window(5, Duration::from_secs(1))
            .with_safety_margin(Duration::ZERO)
            .with_min_interval(Duration::from_millis(50));
        assert_eq!(config.max_calls, 5);
        assert_eq!(config.safety_margin, Duration::ZERO);
        assert_eq!(config.min_interval, Duration::from_millis(50));
    }

    // ==================== Acquire Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_is_immediate() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_window(5, Duration::from_secs(60)));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.calls_in_window(), 5);
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_oldest_ages_out() {
        let config = RateLimiterConfig::per_window(3, Duration::from_secs(10))
            .with_safety_margin(Duration::from_millis(100));
        let limiter = RateLimiter::new(config);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        assert!(Instant::now().duration_since(start) >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_quota() {
        let max_calls = 4;
        let window = Duration::from_secs(5);
        let limiter = Arc::new(RateLimiter::new(
            RateLimiterConfig::per_window(max_calls, window).with_safety_margin(Duration::ZERO),
        ));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            let stamps = Arc::clone(&stamps);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                stamps.lock().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stamps = stamps.lock().clone();
        assert_eq!(stamps.len(), 25);
        assert_quota_respected(&stamps, max_calls as usize, window);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spacing() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::per_window(100, Duration::from_secs(60))
                .with_min_interval(Duration::from_millis(250)),
        );
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_window() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_window(2, Duration::from_secs(60)));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.remaining(), 0);
        limiter.reset();
        assert_eq!(limiter.remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_expire_after_window() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_window(2, Duration::from_secs(1)));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(limiter.calls_in_window(), 0);
    }

    #[test]
    fn test_config_deserializes_millis() {
        let config: RateLimiterConfig =
            serde_json::from_str(r#"{"max_calls": 10, "window": 1000}"#).unwrap();
        assert_eq!(config.max_calls, 10);
        assert_eq!(config.window, Duration::from_secs(1));
        assert_eq!(config.safety_margin, Duration::from_millis(100));
    }
}

//! Per-provider rate-limit window tracking.
//!
//! Mirrors the windowed quota runtime used elsewhere in this codebase: a
//! fixed-size counting window that rolls over once its duration elapses,
//! plus an optional explicit rate-limit-hit marker reported by a provider's
//! response headers (e.g. HTTP 429/`Retry-After`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use ingest_types::{RateLimitConfig, RateLimitStatus};

struct Window {
    config: RateLimitConfig,
    count: u64,
    window_start: Instant,
    explicit_limit_until: Option<Instant>,
}

impl Window {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            count: 0,
            window_start: Instant::now(),
            explicit_limit_until: None,
        }
    }

    fn roll_if_elapsed(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.config.window {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn status(&self, now: Instant) -> RateLimitStatus {
        let elapsed = now.duration_since(self.window_start);
        let remaining_in_window = self.config.window.saturating_sub(elapsed);
        #[allow(clippy::cast_precision_loss)]
        let usage_ratio = self.count as f64 / self.config.max_requests.max(1) as f64;
        let explicit_retry = self
            .explicit_limit_until
            .map(|until| until.saturating_duration_since(now))
            .filter(|d| !d.is_zero());
        let is_rate_limited = explicit_retry.is_some() || self.count >= self.config.max_requests;
        let retry_after = explicit_retry.or_else(|| {
            if self.count >= self.config.max_requests {
                Some(remaining_in_window)
            } else {
                None
            }
        });
        RateLimitStatus {
            count: self.count,
            limit: self.config.max_requests,
            usage_ratio,
            is_rate_limited,
            retry_after,
            reset_at: Utc::now() + chrono::Duration::from_std(remaining_in_window).unwrap_or_default(),
        }
    }
}

/// Tracks request counts and rate-limit state per provider.
#[derive(Default)]
pub struct RateLimitTracker {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimitTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider with its rate-limit configuration. Re-registering
    /// replaces the configuration but preserves the current window's count.
    pub fn register_provider(&self, provider: &str, config: RateLimitConfig) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows
            .entry(provider.to_string())
            .and_modify(|w| w.config = config.clone())
            .or_insert_with(|| Window::new(config));
    }

    /// Record a consumed request, rolling the window over if it has elapsed.
    /// Unregistered providers are ignored.
    pub fn record_request(&self, provider: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(window) = windows.get_mut(provider) {
            let now = Instant::now();
            window.roll_if_elapsed(now);
            window.count += 1;
        }
    }

    /// Record an explicit rate-limit signal from the provider (e.g. HTTP 429),
    /// blocking further requests until `retry_after` elapses regardless of
    /// the local window count.
    pub fn record_rate_limit_hit(&self, provider: &str, retry_after: Duration) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(window) = windows.get_mut(provider) {
            window.explicit_limit_until = Some(Instant::now() + retry_after);
        }
    }

    /// Returns `true` if `provider` is currently rate limited, either by
    /// local window exhaustion or an explicit hit.
    #[must_use]
    pub fn is_rate_limited(&self, provider: &str) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.get_mut(provider).is_some_and(|window| {
            let now = Instant::now();
            window.roll_if_elapsed(now);
            window.status(now).is_rate_limited
        })
    }

    /// Returns `true` if `provider`'s usage ratio has crossed
    /// `config.warn_threshold_ratio`, without yet being fully limited.
    #[must_use]
    pub fn is_approaching_limit(&self, provider: &str) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.get_mut(provider).is_some_and(|window| {
            let now = Instant::now();
            window.roll_if_elapsed(now);
            let status = window.status(now);
            !status.is_rate_limited && status.usage_ratio >= window.config.warn_threshold_ratio
        })
    }

    /// Time remaining until `provider`'s window resets (or its explicit
    /// rate-limit hit clears, if later). `None` for unregistered providers.
    #[must_use]
    pub fn time_until_reset(&self, provider: &str) -> Option<Duration> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.get_mut(provider).map(|window| {
            let now = Instant::now();
            window.roll_if_elapsed(now);
            window.status(now).retry_after.unwrap_or_default()
        })
    }

    /// Full status snapshot for `provider`, if registered.
    #[must_use]
    pub fn status(&self, provider: &str) -> Option<RateLimitStatus> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.get_mut(provider).map(|window| {
            let now = Instant::now();
            window.roll_if_elapsed(now);
            window.status(now)
        })
    }

    /// Clear any explicit rate-limit hit and reset the local counting window
    /// for `provider`, e.g. after an operator override.
    pub fn clear_rate_limit_state(&self, provider: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(window) = windows.get_mut(provider) {
            window.explicit_limit_until = None;
            window.count = 0;
            window.window_start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RateLimitConfig {
        RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(60),
            strategy: ingest_types::QuotaConsumptionStrategy::Unit,
            warn_threshold_ratio: 0.66,
        }
    }

    #[test]
    fn becomes_rate_limited_after_max_requests() {
        let tracker = RateLimitTracker::new();
        tracker.register_provider("p1", cfg());
        for _ in 0..3 {
            assert!(!tracker.is_rate_limited("p1"));
            tracker.record_request("p1");
        }
        assert!(tracker.is_rate_limited("p1"));
    }

    #[test]
    fn approaching_limit_before_fully_limited() {
        let tracker = RateLimitTracker::new();
        tracker.register_provider("p1", cfg());
        tracker.record_request("p1");
        tracker.record_request("p1");
        assert!(tracker.is_approaching_limit("p1"));
        assert!(!tracker.is_rate_limited("p1"));
    }

    #[test]
    fn explicit_hit_overrides_local_count() {
        let tracker = RateLimitTracker::new();
        tracker.register_provider("p1", cfg());
        tracker.record_rate_limit_hit("p1", Duration::from_secs(30));
        assert!(tracker.is_rate_limited("p1"));
        assert!(tracker.time_until_reset("p1").unwrap() <= Duration::from_secs(30));
    }

    #[test]
    fn clear_resets_state() {
        let tracker = RateLimitTracker::new();
        tracker.register_provider("p1", cfg());
        tracker.record_rate_limit_hit("p1", Duration::from_secs(30));
        tracker.clear_rate_limit_state("p1");
        assert!(!tracker.is_rate_limited("p1"));
    }
}

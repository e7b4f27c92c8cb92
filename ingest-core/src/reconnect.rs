//! Gated exponential backoff for streaming reconnects.
//!
//! The gate is binary: a session is either eligible to attempt a reconnect
//! now, or it must wait out the current backoff delay. Each failed attempt
//! advances the exponential delay (capped) and applies multiplicative
//! jitter, the same shape as the reconnect backoff used by this codebase's
//! streaming supervisor.

use ingest_types::BackoffConfig;
use rand_helpers::jitter_factor;

mod rand_helpers {
    /// Deterministic-free jitter factor in `[min, max)` using the thread RNG.
    pub fn jitter_factor(min: f64, max: f64) -> f64 {
        use rand::Rng;
        if max <= min {
            return min;
        }
        rand::rng().random_range(min..max)
    }
}

/// Tracks reconnect attempts for a single streaming session and computes the
/// next backoff delay.
#[derive(Debug, Clone)]
pub struct ReconnectHelper {
    config: BackoffConfig,
    attempts: u32,
}

impl ReconnectHelper {
    /// Create a new helper with zero attempts recorded.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Number of consecutive failed attempts recorded so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the attempt counter after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Record a failed attempt and return the jittered delay before the next
    /// one, or `None` if `max_attempts` has been exhausted.
    pub fn record_failure_and_next_delay(&mut self) -> Option<std::time::Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_for_attempt(self.attempts))
    }

    /// True once `max_attempts` consecutive failures have been recorded.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// Compute the jittered delay for the given 1-based attempt number,
    /// without mutating state. Exposed for testing the backoff curve shape.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let unjittered = self
            .config
            .base_ms
            .saturating_mul(self.config.factor.saturating_pow(attempt.saturating_sub(1)) as u64)
            .min(self.config.cap_ms);
        let factor = jitter_factor(self.config.jitter_min, self.config.jitter_max);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = ((unjittered as f64) * factor).round() as u64;
        std::time::Duration::from_millis(jittered.min(self.config.cap_ms))
    }
}

/// Binary gate ensuring at most one reconnect attempt runs at a time for a
/// given session. Concurrent callers of [`ReconnectGate::try_enter`] while an
/// attempt is in flight all observe `None` except the one that is currently
/// driving the attempt.
pub struct ReconnectGate {
    helper: std::sync::Mutex<ReconnectHelper>,
    in_flight: std::sync::atomic::AtomicBool,
}

impl ReconnectGate {
    /// Create a new gate, initially unlocked, with zero attempts recorded.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            helper: std::sync::Mutex::new(ReconnectHelper::new(config)),
            in_flight: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Attempt to acquire the gate. Returns `None` if another attempt is
    /// already in flight; otherwise returns a guard that releases the gate
    /// on drop.
    #[must_use]
    pub fn try_enter(self: &std::sync::Arc<Self>) -> Option<ReconnectGuard> {
        use std::sync::atomic::Ordering;
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|()| ReconnectGuard {
                gate: std::sync::Arc::clone(self),
            })
    }

    /// True if `max_attempts` has been exhausted on the wrapped helper.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.helper.lock().unwrap_or_else(|e| e.into_inner()).exhausted()
    }

    /// Reset the wrapped helper's attempt counter after a successful reconnect.
    pub fn reset(&self) {
        self.helper.lock().unwrap_or_else(|e| e.into_inner()).reset();
    }
}

/// Holds the reconnect gate open for the duration of one attempt.
pub struct ReconnectGuard {
    gate: std::sync::Arc<ReconnectGate>,
}

impl ReconnectGuard {
    /// Record a failed attempt against the wrapped helper and return the
    /// jittered delay before the next one, or `None` once exhausted.
    pub fn record_failure_and_next_delay(&self) -> Option<std::time::Duration> {
        self.gate
            .helper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_failure_and_next_delay()
    }
}

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, std::sync::atomic::Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let helper = ReconnectHelper::new(BackoffConfig {
            base_ms: 2_000,
            cap_ms: 60_000,
            factor: 2,
            jitter_min: 0.8,
            jitter_max: 1.2,
            max_attempts: 10,
        });
        for attempt in 1..=20 {
            let d = helper.delay_for_attempt(attempt);
            assert!(d.as_millis() <= 60_000);
        }
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut helper = ReconnectHelper::new(BackoffConfig {
            max_attempts: 3,
            ..BackoffConfig::default()
        });
        assert!(helper.record_failure_and_next_delay().is_some());
        assert!(helper.record_failure_and_next_delay().is_some());
        assert!(helper.record_failure_and_next_delay().is_some());
        assert!(helper.record_failure_and_next_delay().is_none());
        assert!(helper.exhausted());
    }

    #[test]
    fn reset_clears_attempts() {
        let mut helper = ReconnectHelper::new(BackoffConfig::default());
        helper.record_failure_and_next_delay();
        helper.record_failure_and_next_delay();
        assert_eq!(helper.attempts(), 2);
        helper.reset();
        assert_eq!(helper.attempts(), 0);
    }

    #[test]
    fn gate_rejects_concurrent_entry() {
        let gate = std::sync::Arc::new(ReconnectGate::new(BackoffConfig::default()));
        let guard = gate.try_enter().expect("first caller wins the gate");
        assert!(gate.try_enter().is_none(), "second caller must observe the gate as held");
        drop(guard);
        assert!(gate.try_enter().is_some(), "gate reopens once the holder drops");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn gate_admits_one_winner_among_many_concurrent_callers() {
        let gate = std::sync::Arc::new(ReconnectGate::new(BackoffConfig::default()));
        // All 16 callers attempt entry at the same instant via the barrier;
        // whichever wins holds its guard for a while so the other 15 attempts
        // are genuinely concurrent with the hold, not serialized around a
        // guard that's already been dropped.
        let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(16));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let gate = std::sync::Arc::clone(&gate);
            let barrier = std::sync::Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                let guard = gate.try_enter();
                let won = guard.is_some();
                if won {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                drop(guard);
                won
            }));
        }
        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

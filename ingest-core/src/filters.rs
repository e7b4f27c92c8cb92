//! Monotonic sequence-number enforcement per `(source, symbol)`.
//!
//! Streaming providers occasionally redeliver or reorder messages around a
//! reconnect. The gate remembers the highest sequence number observed per
//! key and rejects anything at or below it, so downstream consumers never
//! observe sequence numbers moving backwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::time::interval;

struct Entry {
    last_sequence: u64,
    seen_at: Instant,
}

/// Tracks the last-seen sequence number per key and evicts stale entries in
/// the background so memory doesn't grow unbounded for symbols that stop
/// streaming.
pub struct MonotonicGate {
    state: Mutex<HashMap<String, Entry>>,
}

impl MonotonicGate {
    /// Create a gate and spawn its background reaper task.
    ///
    /// The reaper holds only a [`Weak`] reference to the gate, so it
    /// terminates on its own once the last `Arc<MonotonicGate>` is dropped;
    /// callers do not need to explicitly stop it.
    #[must_use]
    pub fn spawn(reap_interval: Duration, max_idle: Duration) -> Arc<Self> {
        let gate = Arc::new(Self {
            state: Mutex::new(HashMap::new()),
        });
        let weak: Weak<Self> = Arc::downgrade(&gate);
        tokio::spawn(async move {
            let mut ticker = interval(reap_interval);
            loop {
                ticker.tick().await;
                let Some(gate) = weak.upgrade() else {
                    return;
                };
                gate.reap(max_idle);
            }
        });
        gate
    }

    fn reap(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.retain(|_, entry| now.duration_since(entry.seen_at) < max_idle);
    }

    /// Returns `true` if `sequence` is strictly greater than the last
    /// sequence observed for `key`, recording it as the new high-water mark
    /// when it is. The first observation for a key is always accepted.
    pub fn accept(&self, key: &str, sequence: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match state.get_mut(key) {
            Some(entry) if sequence <= entry.last_sequence => false,
            Some(entry) => {
                entry.last_sequence = sequence;
                entry.seen_at = now;
                true
            }
            None => {
                state.insert(
                    key.to_string(),
                    Entry {
                        last_sequence: sequence,
                        seen_at: now,
                    },
                );
                true
            }
        }
    }

    /// Forget any recorded state for `key`, e.g. after a reconnect gap event
    /// where sequence numbering restarts from the provider's side.
    pub fn reset(&self, key: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_increasing_sequences() {
        let gate = MonotonicGate::spawn(Duration::from_secs(60), Duration::from_secs(300));
        assert!(gate.accept("alpaca:AAPL", 5));
        assert!(gate.accept("alpaca:AAPL", 6));
        assert!(!gate.accept("alpaca:AAPL", 6));
        assert!(!gate.accept("alpaca:AAPL", 3));
        assert!(gate.accept("alpaca:AAPL", 7));
    }

    #[tokio::test]
    async fn reset_allows_renumbering_from_scratch() {
        let gate = MonotonicGate::spawn(Duration::from_secs(60), Duration::from_secs(300));
        gate.accept("alpaca:AAPL", 100);
        gate.reset("alpaca:AAPL");
        assert!(gate.accept("alpaca:AAPL", 1));
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let gate = MonotonicGate::spawn(Duration::from_secs(60), Duration::from_secs(300));
        assert!(gate.accept("alpaca:AAPL", 10));
        assert!(gate.accept("polygon:AAPL", 1));
    }
}

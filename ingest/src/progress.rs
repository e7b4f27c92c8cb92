//! Progress tracker (C11): in-memory backfill progress accounting, driven by
//! the composite provider and storage sink as they make progress through a
//! symbol's requested range, per `SPEC_FULL.md` §4.12.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ingest_types::{BackfillProgress, SymbolBackfillProgress};

/// Tracks per-symbol backfill progress behind one `Mutex`-guarded map,
/// following the same single-lock-per-resource discipline as
/// [`ingest_core::SubscriptionManager`] and the coordinator's claim mutex.
#[derive(Default)]
pub struct ProgressTracker {
    symbols: Mutex<HashMap<String, SymbolBackfillProgress>>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `symbol`'s backfill window `[range_start, range_end]`.
    /// Overwrites any prior entry for the same symbol.
    pub fn start(&self, symbol: &str, range_start: DateTime<Utc>, range_end: DateTime<Utc>) {
        let mut guard = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(
            symbol.to_string(),
            SymbolBackfillProgress {
                symbol: symbol.to_string(),
                range_start,
                range_end,
                watermark: None,
                complete: false,
                failed: false,
                error: None,
            },
        );
    }

    /// Advance `symbol`'s watermark, marking it complete once the watermark
    /// reaches `range_end`, and clearing any prior failed state — a resumed
    /// backfill is back in progress. A no-op if `symbol` was never
    /// [`start`](Self::start)ed.
    pub fn record_progress(&self, symbol: &str, watermark: DateTime<Utc>) {
        let mut guard = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get_mut(symbol) {
            entry.watermark = Some(watermark);
            entry.complete = watermark >= entry.range_end;
            entry.failed = false;
            entry.error = None;
        }
    }

    /// Mark `symbol` terminally complete regardless of its current watermark.
    pub fn complete(&self, symbol: &str) {
        let mut guard = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get_mut(symbol) {
            entry.complete = true;
            entry.failed = false;
            entry.error = None;
        }
    }

    /// Mark `symbol` failed with `error`: leaves the watermark untouched so a
    /// caller can inspect how far it got before failing, but flips `failed`
    /// and records `error` so it's observably distinct from a symbol still
    /// in progress (`spec.md` §3's `isFailed`/`error?` per-symbol state).
    pub fn fail(&self, symbol: &str, error: impl Into<String>) {
        let mut guard = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get_mut(symbol) {
            entry.complete = false;
            entry.failed = true;
            entry.error = Some(error.into());
        }
    }

    /// Cheap, lock-scoped snapshot of all tracked symbols' progress.
    #[must_use]
    pub fn snapshot(&self) -> BackfillProgress {
        let guard = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        BackfillProgress {
            symbols: guard.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn range() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::days(1), now)
    }

    #[test]
    fn record_progress_marks_complete_at_range_end() {
        let tracker = ProgressTracker::new();
        let (start, end) = range();
        tracker.start("AAPL", start, end);
        tracker.record_progress("AAPL", end);
        let snap = tracker.snapshot();
        assert!(snap.symbols["AAPL"].complete);
        assert_eq!(snap.overall_fraction(), 1.0);
    }

    #[test]
    fn partial_progress_is_not_complete() {
        let tracker = ProgressTracker::new();
        let (start, end) = range();
        tracker.start("AAPL", start, end);
        tracker.record_progress("AAPL", start + Duration::hours(1));
        let snap = tracker.snapshot();
        assert!(!snap.symbols["AAPL"].complete);
        assert_eq!(snap.overall_fraction(), 0.0);
    }

    #[test]
    fn fail_clears_complete_flag_and_records_error() {
        let tracker = ProgressTracker::new();
        let (start, end) = range();
        tracker.start("AAPL", start, end);
        tracker.complete("AAPL");
        tracker.fail("AAPL", "connector timed out");
        let snap = tracker.snapshot();
        assert!(!snap.symbols["AAPL"].complete);
        assert!(snap.symbols["AAPL"].failed);
        assert_eq!(snap.symbols["AAPL"].error.as_deref(), Some("connector timed out"));
    }

    #[test]
    fn failed_symbol_is_distinguishable_from_in_progress() {
        let tracker = ProgressTracker::new();
        let (start, end) = range();
        tracker.start("AAPL", start, end);
        tracker.start("MSFT", start, end);
        tracker.fail("AAPL", "rate limited");

        let snap = tracker.snapshot();
        assert!(!snap.symbols["AAPL"].is_in_progress());
        assert!(snap.symbols["MSFT"].is_in_progress());
        assert_eq!(snap.failed_symbols(), vec!["AAPL"]);
    }

    #[test]
    fn resumed_progress_clears_prior_failure() {
        let tracker = ProgressTracker::new();
        let (start, end) = range();
        tracker.start("AAPL", start, end);
        tracker.fail("AAPL", "transient error");
        tracker.record_progress("AAPL", start + Duration::hours(1));

        let snap = tracker.snapshot();
        assert!(!snap.symbols["AAPL"].failed);
        assert!(snap.symbols["AAPL"].error.is_none());
        assert!(snap.failed_symbols().is_empty());
    }

    #[test]
    fn overall_fraction_averages_across_symbols() {
        let tracker = ProgressTracker::new();
        let (start, end) = range();
        tracker.start("AAPL", start, end);
        tracker.start("MSFT", start, end);
        tracker.record_progress("AAPL", end);
        assert_eq!(tracker.snapshot().overall_fraction(), 0.5);
    }
}

//! Core data model shared by the event pipeline, coordinator, and storage sink.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::{Capability, EventKind};
use crate::connector::ProviderKey;
use crate::market::AssetKind;

/// A single normalized market data event flowing through the pipeline.
///
/// `payload` is left as an opaque JSON value rather than a closed enum: the
/// pipeline's job is to move, buffer, and persist events, not to interpret
/// provider-specific field layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketEvent {
    /// Event timestamp as reported by the originating provider.
    pub timestamp: DateTime<Utc>,
    /// Instrument symbol, as subscribed.
    pub symbol: String,
    /// Discriminant for `payload`'s shape.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Opaque, provider-normalized payload.
    pub payload: serde_json::Value,
    /// Monotonically increasing sequence number, scoped to `(source, symbol)`.
    pub sequence: u64,
    /// Provider key that produced this event.
    pub source: String,
    /// Schema version of `payload`, bumped on breaking payload shape changes.
    pub schema_version: u16,
}

impl MarketEvent {
    /// Build a synthetic gap-marker event spanning a reconnect outage.
    ///
    /// `sequence` continues the source's sequence counter; `payload` carries
    /// `disconnectedAt`/`reconnectedAt` as ISO-8601 strings.
    #[must_use]
    pub fn gap(
        symbol: impl Into<String>,
        source: impl Into<String>,
        sequence: u64,
        disconnected_at: DateTime<Utc>,
        reconnected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: reconnected_at,
            symbol: symbol.into(),
            kind: EventKind::Gap,
            payload: serde_json::json!({
                "disconnectedAt": disconnected_at,
                "reconnectedAt": reconnected_at,
            }),
            sequence,
            source: source.into(),
            schema_version: 1,
        }
    }
}

/// Static metadata a provider reports about itself at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Stable provider key used in routing policy and telemetry.
    pub key: String,
    /// Human-readable display name.
    pub name: String,
    /// Asset classes this provider can serve.
    pub supported_asset_classes: Vec<AssetKind>,
    /// Capabilities (history/streaming) this provider implements.
    pub capabilities: Vec<Capability>,
    /// Default priority; lower values are tried first absent a routing override.
    pub priority: i32,
}

impl ProviderDescriptor {
    /// Returns true if this provider declares `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Point-in-time snapshot of a provider's rate-limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// Requests observed in the current window.
    pub count: u64,
    /// Configured maximum requests per window.
    pub limit: u64,
    /// `count / limit`, in `[0.0, +inf)` (may exceed 1.0 transiently after a burst).
    pub usage_ratio: f64,
    /// True once `count >= limit` or a provider-reported rate-limit hit is active.
    pub is_rate_limited: bool,
    /// Time remaining until a caller may retry, if currently limited.
    pub retry_after: Option<Duration>,
    /// Wall-clock time at which the current window resets.
    pub reset_at: DateTime<Utc>,
}

/// A logical subscription to a symbol's event stream, addressed by a dense,
/// provider-scoped id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Dense id allocated by the subscription manager, stable for the
    /// lifetime of the logical subscription even across provider failover.
    pub id: u64,
    /// Provider currently serving this subscription.
    pub provider: String,
    /// Subscribed symbol.
    pub symbol: String,
    /// Kind of event stream requested.
    pub kind: EventKind,
}

/// A claim on exclusive ownership of ingesting a symbol, persisted as JSON
/// under the coordinator's claim directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolClaim {
    /// Claimed symbol (also encoded, sanitized, in the claim file name).
    pub symbol: String,
    /// Opaque identifier of the owning engine instance (e.g. hostname:pid).
    pub owner_id: String,
    /// Time the claim was first acquired.
    pub claimed_at: DateTime<Utc>,
    /// Time of the owner's most recent heartbeat refresh.
    pub heartbeat_at: DateTime<Utc>,
}

/// Emitted by the reconnect helper whenever a streaming session disconnects
/// and later resumes (or permanently fails).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectionEvent {
    /// Provider the session reconnected to (or gave up on).
    pub provider: String,
    /// Time the session was observed disconnected.
    pub disconnected_at: DateTime<Utc>,
    /// Time the session re-established a ready stream, if it succeeded.
    pub reconnected_at: Option<DateTime<Utc>>,
    /// Number of attempts made, including the eventually-successful one.
    pub attempts: u32,
    /// True if `max_attempts` was exhausted without reconnecting.
    pub gave_up: bool,
}

/// A rule describing when the failover router should switch a routing
/// group's active provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverRule {
    /// Provider this rule watches.
    pub provider: String,
    /// Consecutive reconnect failures before triggering failover away from `provider`.
    pub max_consecutive_failures: u32,
    /// Ordered fallback providers to try, in order, once triggered.
    pub fallback_order: Vec<String>,
}

/// Snapshot of historical backfill progress for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolBackfillProgress {
    /// Symbol being backfilled.
    pub symbol: String,
    /// Earliest timestamp requested.
    pub range_start: DateTime<Utc>,
    /// Latest timestamp requested.
    pub range_end: DateTime<Utc>,
    /// Latest timestamp actually ingested so far.
    pub watermark: Option<DateTime<Utc>>,
    /// True once `watermark >= range_end`.
    pub complete: bool,
    /// True once this symbol has been marked failed and not since restarted.
    pub failed: bool,
    /// The error message from the most recent failure, if `failed` is true.
    pub error: Option<String>,
}

impl SymbolBackfillProgress {
    /// True if this symbol is neither complete nor failed.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        !self.complete && !self.failed
    }
}

/// Aggregated backfill progress across all tracked symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackfillProgress {
    /// Per-symbol progress snapshots.
    pub symbols: HashMap<String, SymbolBackfillProgress>,
}

impl BackfillProgress {
    /// Fraction of tracked symbols that are complete, in `[0.0, 1.0]`.
    /// Returns `0.0` when no symbols are tracked.
    #[must_use]
    pub fn overall_fraction(&self) -> f64 {
        if self.symbols.is_empty() {
            return 0.0;
        }
        let done = self.symbols.values().filter(|s| s.complete).count();
        #[allow(clippy::cast_precision_loss)]
        let fraction = done as f64 / self.symbols.len() as f64;
        fraction
    }

    /// Symbols currently in the failed state, per `spec.md` §3's
    /// `failedSymbols` aggregate view.
    #[must_use]
    pub fn failed_symbols(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .symbols
            .values()
            .filter(|s| s.failed)
            .map(|s| s.symbol.as_str())
            .collect();
        failed.sort_unstable();
        failed
    }
}

/// Provider key newtype used by in-process routing data structures
/// (see [`ProviderKey`] for the static-str variant used in policy tables).
pub type ProviderId = ProviderKey;

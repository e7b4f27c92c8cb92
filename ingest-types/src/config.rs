//! Configuration types shared across the engine, middleware, and connectors.

use std::path::PathBuf;
use std::time::Duration;

use crate::routing_policy::RoutingPolicy;
use serde::{Deserialize, Serialize};

/// Strategy for selecting among eligible providers for a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FetchStrategy {
    /// Use priority order and fall back to the next provider on failure.
    #[default]
    PriorityWithFallback,
    /// Race all eligible providers concurrently and return the first success.
    Latency,
}

/// Strategy for consuming units from a quota when handling requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum QuotaConsumptionStrategy {
    /// Each request deducts exactly one unit from the quota budget.
    #[default]
    Unit,
    /// The caller specifies a weight (units) to deduct per request.
    Weighted,
}

/// Configuration for a provider's rate-limit window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed within a single window.
    pub max_requests: u64,
    /// Duration of the accounting window.
    pub window: Duration,
    /// Strategy for how requests consume units from the budget.
    pub strategy: QuotaConsumptionStrategy,
    /// Usage ratio (0.0-1.0) at which `is_approaching_limit` starts returning true.
    pub warn_threshold_ratio: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window: Duration::from_secs(60),
            strategy: QuotaConsumptionStrategy::Unit,
            warn_threshold_ratio: 0.8,
        }
    }
}

/// Exponential backoff configuration for reconnecting streaming sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base backoff delay in milliseconds (delay for the first retry).
    pub base_ms: u64,
    /// Maximum backoff delay in milliseconds (the cap).
    pub cap_ms: u64,
    /// Exponential factor applied per additional failure (>= 1).
    pub factor: u32,
    /// Lower bound of the multiplicative jitter window, e.g. `0.8`.
    pub jitter_min: f64,
    /// Upper bound of the multiplicative jitter window, e.g. `1.2`.
    pub jitter_max: f64,
    /// Maximum number of consecutive reconnect attempts before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 2_000,
            cap_ms: 60_000,
            factor: 2,
            jitter_min: 0.8,
            jitter_max: 1.2,
            max_attempts: 10,
        }
    }
}

/// How storage partition files are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "camelCase")]
pub enum PathLayout {
    /// All partitions in a single flat directory.
    Flat,
    /// Partitioned by symbol, then file.
    BySymbol,
    /// Partitioned by date, then file.
    ByDate,
    /// Partitioned by event type, then file.
    ByType,
    /// Partitioned by source provider, then file.
    BySource,
    /// Partitioned by asset class, then file.
    ByAssetClass,
    /// Nested symbol/type/date hierarchy.
    #[default]
    Hierarchical,
    /// Canonical `source/assetClass/symbol/type/date` layout.
    Canonical,
}

/// Compression codec applied to flushed storage partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    Snappy,
    Gzip,
    Zstd,
    Lz4,
    Brotli,
}

/// Configuration for the columnar storage sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory under which partitions are written.
    pub root_dir: PathBuf,
    /// Number of buffered events per partition before an implicit flush.
    pub buffer_size: usize,
    /// Maximum time a partition may hold buffered events before a timed flush.
    pub flush_interval: Duration,
    /// Directory/file layout strategy.
    pub path_layout: PathLayout,
    /// Compression codec for flushed files.
    pub compression: Compression,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data"),
            buffer_size: 10_000,
            flush_interval: Duration::from_secs(30),
            path_layout: PathLayout::Hierarchical,
            compression: Compression::None,
        }
    }
}

/// Configuration for the filesystem-backed instance coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Directory holding one claim file per symbol.
    pub claim_dir: PathBuf,
    /// A claim is considered stale if its heartbeat is older than this.
    pub stale_timeout: Duration,
    /// Interval at which an owned claim's heartbeat is refreshed.
    pub heartbeat_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            claim_dir: PathBuf::from("./claims"),
            stale_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
        }
    }
}

/// Configuration for the composite historical provider's ordering and
/// rotation policy (`spec.md` §6's `failureBackoffDuration`,
/// `enableCrossValidation`, `enableRateLimitRotation`,
/// `rateLimitRotationThreshold` options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeConfig {
    /// Time to skip a provider after a non-rate-limit failure.
    pub failure_backoff_duration: Duration,
    /// On success, spawn a comparison call to a different provider and log
    /// discrepancies in the first 5 bars.
    pub enable_cross_validation: bool,
    /// Use usage-based ordering (rate-limited/approaching-limit scoring)
    /// rather than strict descriptor priority.
    pub enable_rate_limit_rotation: bool,
    /// Usage ratio above which a provider is considered "approaching limit"
    /// for rotation scoring purposes.
    pub rate_limit_rotation_threshold: f64,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            failure_backoff_duration: Duration::from_secs(5 * 60),
            enable_cross_validation: false,
            enable_rate_limit_rotation: true,
            rate_limit_rotation_threshold: 0.8,
        }
    }
}

/// A recurring maintenance window during which non-essential operations are paused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// Operator-facing label, e.g. `"sunday-index-rebuild"`.
    pub name: String,
    /// Day of week, 0 = Sunday .. 6 = Saturday, matching `chrono::Weekday::num_days_from_sunday`.
    pub weekday: u8,
    /// Window start, minutes since UTC midnight.
    pub start_minute: u16,
    /// Window duration in minutes.
    pub duration_minutes: u16,
    /// If set, only these operation names may run in this window; `None` allows any.
    pub allowed_ops: Option<Vec<String>>,
}

/// Configuration for the operational scheduler's trading-hours gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Recurring maintenance windows during which trading-hours-sensitive
    /// operations are deferred.
    pub maintenance_windows: Vec<MaintenanceWindow>,
    /// Regular trading session open, minutes since UTC midnight.
    pub session_open_minute: u16,
    /// Regular trading session close, minutes since UTC midnight.
    pub session_close_minute: u16,
    /// Pre-market open, minutes since UTC midnight.
    pub premarket_open_minute: u16,
    /// Post-market close, minutes since UTC midnight.
    pub postmarket_close_minute: u16,
    /// Days of week the session runs on (0 = Sunday .. 6 = Saturday).
    pub trading_weekdays: Vec<u8>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            maintenance_windows: Vec::new(),
            session_open_minute: 9 * 60 + 30,
            session_close_minute: 16 * 60,
            premarket_open_minute: 4 * 60,
            postmarket_close_minute: 20 * 60,
            trading_weekdays: vec![1, 2, 3, 4, 5],
        }
    }
}

/// Global configuration for the ingestion engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Unified routing policy controlling provider ordering and strictness.
    pub routing_policy: RoutingPolicy,
    /// Strategy for fetching from multiple providers on a pull request.
    pub fetch_strategy: FetchStrategy,
    /// Timeout for an individual provider call.
    pub provider_timeout: Duration,
    /// Optional overall request deadline for fan-out aggregations.
    pub request_timeout: Option<Duration>,
    /// Backoff configuration used by streaming reconnects.
    pub backoff: BackoffConfig,
    /// Rate limit configuration applied per provider unless overridden.
    pub rate_limit: RateLimitConfig,
    /// Composite historical provider ordering/rotation configuration.
    pub composite: CompositeConfig,
    /// Storage sink configuration.
    pub storage: StorageConfig,
    /// Instance coordinator configuration.
    pub coordinator: CoordinatorConfig,
    /// Operational scheduler configuration.
    pub scheduler: SchedulerConfig,
    /// Capacity of each subscriber's bounded, drop-oldest event queue.
    pub publisher_queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            routing_policy: RoutingPolicy::default(),
            fetch_strategy: FetchStrategy::default(),
            provider_timeout: Duration::from_secs(5),
            request_timeout: None,
            backoff: BackoffConfig::default(),
            rate_limit: RateLimitConfig::default(),
            composite: CompositeConfig::default(),
            storage: StorageConfig::default(),
            coordinator: CoordinatorConfig::default(),
            scheduler: SchedulerConfig::default(),
            publisher_queue_capacity: 50_000,
        }
    }
}

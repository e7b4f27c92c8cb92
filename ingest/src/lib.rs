//! `ingest` assembles multi-source market data retrieval into one engine.
//!
//! Overview
//! - Routes historical requests across connectors through [`composite::CompositeHistoryProvider`],
//!   merging and cross-validating results per provider priority.
//! - Maintains live streams through [`streaming::FailoverRouter`], failing over to
//!   the next-priority provider after a configurable run of consecutive errors.
//! - Coordinates symbol ownership across cooperating instances via
//!   [`coordinator::InstanceCoordinator`]'s filesystem claim/heartbeat/steal protocol.
//! - Tracks long-running backfills with [`progress::ProgressTracker`].
//! - Persists the event stream to partitioned, columnar files through [`storage::StorageSink`].
//! - Gates maintenance and backfill operations against trading hours via
//!   [`scheduler::OperationalScheduler`].
//! - Hosts pluggable connectors in a [`adapter::ConnectorRegistry`].
//!
//! Connectors implement the [`ingest_core::IngestConnector`] contract; this
//! crate only orchestrates across them.
#![warn(missing_docs)]

/// Adapter/plugin host: a runtime registry of connector instances.
pub mod adapter;
/// Cross-provider historical data retrieval with merge and cross-validation.
pub mod composite;
/// Filesystem-backed instance coordination for multi-instance deployments.
pub mod coordinator;
/// Backfill progress tracking.
pub mod progress;
/// Trading-hours and maintenance-window aware operation gating.
pub mod scheduler;
/// Buffered, partitioned, columnar event storage.
pub mod storage;
/// Streaming session lifecycle and failover routing.
pub mod streaming;

pub use adapter::ConnectorRegistry;
pub use composite::CompositeHistoryProvider;
pub use coordinator::InstanceCoordinator;
pub use progress::ProgressTracker;
pub use scheduler::{OperationKind, OperationalScheduler, ResourceProfile, SchedulerDecision};
pub use storage::{run_flusher, StorageSink};
pub use streaming::{ConnectionState, FailoverRouter, StreamingSession};

pub use ingest_core::{
    run_cancellable, BoundedPublisher, Cancellable, HistoryProvider, IngestConnector,
    MonotonicGate, RateLimitTracker, ReconnectGate, ReconnectGuard, ReconnectHelper, StreamHandle,
    StreamingProvider, SubscriptionManager, TimeRange,
};
pub use ingest_middleware::{
    BlacklistConnector, BlacklistMiddleware, ConnectorBuilder, RateLimitMiddleware,
    RateLimitedConnector,
};
pub use ingest_types::{
    AssetKind, BackfillProgress, BackoffConfig, Capability, Compression, CompositeConfig,
    CoordinatorConfig, EventKind, Exchange, FailoverRule, IngestConfig, IngestError,
    MaintenanceWindow, MarketEvent, PathLayout, ProviderDescriptor, ProviderId, RateLimitConfig,
    RateLimitStatus, ReconnectionEvent, SchedulerConfig, StorageConfig, Subscription,
    SymbolBackfillProgress, SymbolClaim,
};

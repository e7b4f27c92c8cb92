//! Shared data transfer objects, configuration, and routing policy for the
//! market data ingestion engine.
#![warn(missing_docs)]

mod capability;
mod config;
mod connector;
mod error;
mod market;
mod middleware;
mod model;
pub mod routing_policy;

pub use capability::{Capability, EventKind};
pub use config::{
    BackoffConfig, CompositeConfig, Compression, CoordinatorConfig, FetchStrategy, IngestConfig,
    MaintenanceWindow, PathLayout, QuotaConsumptionStrategy, RateLimitConfig, SchedulerConfig,
    StorageConfig,
};
pub use connector::ProviderKey;
pub use error::IngestError;
pub use market::{AssetKind, Exchange};
pub use middleware::{MiddlewareLayer, MiddlewareStack};
pub use model::{
    BackfillProgress, FailoverRule, MarketEvent, ProviderDescriptor, ProviderId, RateLimitStatus,
    ReconnectionEvent, Subscription, SymbolBackfillProgress, SymbolClaim,
};
pub use routing_policy::{
    Preference, RoutingContext, RoutingPolicy, RoutingPolicyBuilder, ScopeKey,
};

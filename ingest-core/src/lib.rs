//! ingest-core
//!
//! Core traits, pipeline primitives, and streaming lifecycle utilities shared
//! across the market data ingestion engine.
//!
//! - `connector`: the [`connector::IngestConnector`] trait and capability provider traits.
//! - `pipeline`: the bounded, drop-oldest [`pipeline::BoundedPublisher`].
//! - `ratelimit`: per-provider [`ratelimit::RateLimitTracker`] window accounting.
//! - `reconnect`: gated exponential backoff via [`reconnect::ReconnectHelper`].
//! - `subscription`: dense id allocation via [`subscription::SubscriptionManager`].
//! - `filters`: sequence-monotonicity enforcement via [`filters::MonotonicGate`].
//! - `stream`: the [`StreamHandle`] abstraction for long-lived streaming tasks.
//! - `middleware`: the [`Middleware`] trait for wrapping connectors in an onion stack.
#![warn(missing_docs)]

/// Cancellation-aware error wrapping shared by every long-lived operation.
pub mod cancel;
/// Connector capability traits and the primary `IngestConnector` interface.
pub mod connector;
/// Re-export of the workspace error type.
pub mod error;
/// Sequence-monotonicity enforcement per `(source, symbol)`.
pub mod filters;
/// Middleware trait for wrapping `IngestConnector` implementations.
pub mod middleware;
/// Bounded, drop-oldest event fan-out.
pub mod pipeline;
/// Per-provider rate-limit window tracking.
pub mod ratelimit;
/// Gated exponential backoff for streaming reconnects.
pub mod reconnect;
/// Internal stream utilities used by `StreamHandle` and tests.
pub mod stream;
/// Dense subscription id allocation, scoped per provider.
pub mod subscription;

pub use cancel::{Cancellable, run_cancellable};
pub use connector::{HistoryProvider, IngestConnector, StreamingProvider, TimeRange};
pub use error::IngestError;
pub use filters::MonotonicGate;
pub use pipeline::BoundedPublisher;
pub use ratelimit::RateLimitTracker;
pub use reconnect::{ReconnectGate, ReconnectGuard, ReconnectHelper};
pub use stream::StreamHandle;
pub use subscription::SubscriptionManager;

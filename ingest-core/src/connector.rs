//! Provider capability traits and the primary [`IngestConnector`] interface.
//!
//! Mirrors the capability-accessor pattern used throughout this codebase:
//! a provider implements only the roles it actually supports and exposes
//! them through `as_*_provider`, which default to `None`. Composite routing
//! never downcasts a concrete connector type; it only ever asks "does this
//! connector support history/streaming" through these accessors.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_types::{Capability, EventKind, IngestError, ProviderDescriptor};

use crate::pipeline::BoundedPublisher;
use crate::stream::StreamHandle;

/// Inclusive wall-clock range requested from a history provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start of the requested range.
    pub start: DateTime<Utc>,
    /// Inclusive end of the requested range.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Construct a new time range, swapping endpoints if given in reverse order.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }
}

/// Pull-based retrieval of historical events for a symbol.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch historical events for `symbol` within `range`, ordered by timestamp.
    ///
    /// # Errors
    /// Returns [`IngestError::NotFound`] if the symbol is unknown to this
    /// provider, or [`IngestError::Connector`]/[`IngestError::RateLimitExceeded`]
    /// for upstream failures.
    async fn fetch_history(
        &self,
        symbol: &str,
        kind: EventKind,
        range: TimeRange,
    ) -> Result<Vec<ingest_types::MarketEvent>, IngestError>;

    /// Fetch split/dividend-adjusted daily bars for `symbol` within `range`.
    ///
    /// Only meaningful for providers that advertise
    /// [`Capability::AdjustedPrices`]; callers should gate on that capability
    /// before relying on the result being actually adjusted. The default
    /// implementation just returns raw bars unchanged (a trivially-adjusted
    /// projection), for providers that never override it.
    ///
    /// # Errors
    /// Same error conditions as [`HistoryProvider::fetch_history`].
    async fn fetch_adjusted_history(
        &self,
        symbol: &str,
        kind: EventKind,
        range: TimeRange,
    ) -> Result<Vec<ingest_types::MarketEvent>, IngestError> {
        self.fetch_history(symbol, kind, range).await
    }
}

/// Push-based live subscription to a symbol's event stream.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// Open (or extend) a live subscription for `symbols`/`kind`, publishing
    /// normalized events onto `sink` until the returned [`StreamHandle`] is
    /// stopped or aborted.
    ///
    /// # Errors
    /// Returns [`IngestError::Connector`] for connection failures or
    /// [`IngestError::Unauthorized`] for invalid credentials.
    async fn subscribe(
        &self,
        symbols: &[String],
        kind: EventKind,
        sink: Arc<BoundedPublisher>,
    ) -> Result<StreamHandle, IngestError>;
}

/// The primary connector interface implemented by every provider adapter.
///
/// A connector declares its static [`ProviderDescriptor`] and exposes
/// whichever capability roles it implements via the `as_*_provider`
/// accessors; both default to `None`.
pub trait IngestConnector: Send + Sync {
    /// Static metadata describing this provider's identity and capabilities.
    fn descriptor(&self) -> ProviderDescriptor;

    /// Borrow this connector as a [`HistoryProvider`], if supported.
    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        None
    }

    /// Borrow this connector as a [`StreamingProvider`], if supported.
    fn as_streaming_provider(&self) -> Option<&dyn StreamingProvider> {
        None
    }

    /// Convenience check mirroring [`ProviderDescriptor::supports`].
    fn supports(&self, capability: Capability) -> bool {
        self.descriptor().supports(capability)
    }
}

/// Delegating accessor generation for connector wrappers (middleware) that
/// hold an inner `Arc<dyn IngestConnector>` field named `inner`.
///
/// Avoids hand-writing the same two pass-through methods on every middleware
/// layer; see `ingest-middleware` for usage.
#[macro_export]
macro_rules! ingest_connector_accessors {
    () => {
        fn as_history_provider(&self) -> Option<&dyn $crate::connector::HistoryProvider> {
            self.inner.as_history_provider()
        }

        fn as_streaming_provider(&self) -> Option<&dyn $crate::connector::StreamingProvider> {
            self.inner.as_streaming_provider()
        }
    };
}

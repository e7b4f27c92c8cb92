//! Rate-limiting middleware backed by [`ingest_core::RateLimitTracker`].
//!
//! Wraps the inner connector directly, the same way [`crate::blacklist`]
//! does: there is no generic pre/post hook, so the wrapper checks the
//! tracker before delegating and records the request (or an explicit
//! rate-limit signal) after.

use std::sync::Arc;

use async_trait::async_trait;
use ingest_core::connector::{HistoryProvider, StreamingProvider, TimeRange};
use ingest_core::middleware::Middleware;
use ingest_core::{BoundedPublisher, IngestConnector, IngestError, RateLimitTracker, StreamHandle};
use ingest_types::{EventKind, MarketEvent, ProviderDescriptor, RateLimitConfig};

/// Middleware config for constructing a [`RateLimitedConnector`].
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    tracker: Arc<RateLimitTracker>,
}

impl RateLimitMiddleware {
    /// Construct a new layer sharing `tracker` across every connector it wraps,
    /// registering each wrapped provider under its own descriptor key.
    #[must_use]
    pub const fn new(config: RateLimitConfig, tracker: Arc<RateLimitTracker>) -> Self {
        Self { config, tracker }
    }
}

impl Middleware for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn IngestConnector>) -> Arc<dyn IngestConnector> {
        let key = inner.descriptor().key;
        self.tracker.register_provider(&key, self.config.clone());
        Arc::new(RateLimitedConnector {
            inner,
            tracker: self.tracker,
            provider_key: key,
        })
    }

    fn name(&self) -> &'static str {
        "RateLimitedConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_requests": self.config.max_requests,
            "window_ms": self.config.window.as_millis(),
            "warn_threshold_ratio": self.config.warn_threshold_ratio,
        })
    }
}

/// Connector wrapper that gates calls through a shared [`RateLimitTracker`].
pub struct RateLimitedConnector {
    inner: Arc<dyn IngestConnector>,
    tracker: Arc<RateLimitTracker>,
    provider_key: String,
}

impl RateLimitedConnector {
    fn guard(&self) -> Result<(), IngestError> {
        if self.tracker.is_rate_limited(&self.provider_key) {
            let status = self.tracker.status(&self.provider_key);
            let (limit, window_ms) = status.map_or((0, 0), |s| {
                (s.limit, u64::try_from(s.retry_after.unwrap_or_default().as_millis()).unwrap_or(u64::MAX))
            });
            return Err(IngestError::RateLimitExceeded { limit, window_ms });
        }
        Ok(())
    }

    fn observe<T>(&self, result: Result<T, IngestError>) -> Result<T, IngestError> {
        self.tracker.record_request(&self.provider_key);
        if let Err(IngestError::RateLimitExceeded { window_ms, .. }) = &result {
            self.tracker
                .record_rate_limit_hit(&self.provider_key, std::time::Duration::from_millis(*window_ms));
        }
        result
    }
}

impl IngestConnector for RateLimitedConnector {
    fn descriptor(&self) -> ProviderDescriptor {
        self.inner.descriptor()
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        self.inner.as_history_provider().map(|_| self as &dyn HistoryProvider)
    }

    fn as_streaming_provider(&self) -> Option<&dyn StreamingProvider> {
        self.inner
            .as_streaming_provider()
            .map(|_| self as &dyn StreamingProvider)
    }
}

#[async_trait]
impl HistoryProvider for RateLimitedConnector {
    async fn fetch_history(
        &self,
        symbol: &str,
        kind: EventKind,
        range: TimeRange,
    ) -> Result<Vec<MarketEvent>, IngestError> {
        self.guard()?;
        let provider = self
            .inner
            .as_history_provider()
            .expect("as_history_provider checked by accessor");
        let result = provider.fetch_history(symbol, kind, range).await;
        self.observe(result)
    }
}

#[async_trait]
impl StreamingProvider for RateLimitedConnector {
    async fn subscribe(
        &self,
        symbols: &[String],
        kind: EventKind,
        sink: Arc<BoundedPublisher>,
    ) -> Result<StreamHandle, IngestError> {
        self.guard()?;
        let provider = self
            .inner
            .as_streaming_provider()
            .expect("as_streaming_provider checked by accessor");
        let result = provider.subscribe(symbols, kind, sink).await;
        self.observe(result)
    }
}

//! Blacklisting middleware that temporarily disables a provider after it
//! reports a rate-limit or unauthorized condition.
//!
//! Wraps the inner connector directly rather than intercepting through a
//! generic hook: there are only two capability entry points
//! ([`HistoryProvider`]/[`StreamingProvider`]), so each simply checks the
//! blacklist gate before delegating.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ingest_core::connector::{HistoryProvider, StreamingProvider, TimeRange};
use ingest_core::middleware::Middleware;
use ingest_core::{BoundedPublisher, IngestConnector, IngestError, StreamHandle};
use ingest_types::{EventKind, MarketEvent, ProviderDescriptor};

/// Middleware config for constructing a [`BlacklistConnector`].
pub struct BlacklistMiddleware {
    /// Fallback disablement duration used when a provider's own
    /// `RateLimitExceeded` error doesn't carry a usable window.
    pub default_duration: Duration,
}

impl BlacklistMiddleware {
    /// Construct a new layer with the given default disablement duration.
    #[must_use]
    pub const fn new(default_duration: Duration) -> Self {
        Self { default_duration }
    }
}

impl Middleware for BlacklistMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn IngestConnector>) -> Arc<dyn IngestConnector> {
        Arc::new(BlacklistConnector::new(inner, self.default_duration))
    }

    fn name(&self) -> &'static str {
        "BlacklistConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({ "default_duration_ms": self.default_duration.as_millis() })
    }
}

/// Connector wrapper that temporarily disables the inner connector after a
/// rate-limit or unauthorized signal.
pub struct BlacklistConnector {
    inner: Arc<dyn IngestConnector>,
    until: Mutex<Option<Instant>>,
    default_duration: Duration,
}

impl BlacklistConnector {
    /// Wrap `inner`, applying `default_duration` when the upstream error
    /// doesn't specify its own window.
    #[must_use]
    pub fn new(inner: Arc<dyn IngestConnector>, default_duration: Duration) -> Self {
        Self {
            inner,
            until: Mutex::new(None),
            default_duration,
        }
    }

    fn remaining_ms(&self) -> Option<u64> {
        let mut guard = self.until.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(until) = *guard {
            if now < until {
                let ms: u64 = until
                    .saturating_duration_since(now)
                    .as_millis()
                    .try_into()
                    .unwrap_or(u64::MAX);
                return Some(ms.max(1));
            }
            *guard = None;
        }
        None
    }

    fn disable_for(&self, duration: Duration) {
        let mut guard = self.until.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Instant::now() + duration);
    }

    fn duration_for(&self, err: &IngestError) -> Option<Duration> {
        match err {
            IngestError::RateLimitExceeded { window_ms, .. } if *window_ms > 0 => {
                Some(Duration::from_millis(*window_ms))
            }
            IngestError::RateLimitExceeded { .. } | IngestError::Unauthorized { .. } => {
                Some(self.default_duration)
            }
            _ => None,
        }
    }

    fn observe<T>(&self, result: Result<T, IngestError>) -> Result<T, IngestError> {
        if let Err(err) = &result
            && let Some(duration) = self.duration_for(err)
        {
            self.disable_for(duration);
        }
        result
    }

    fn guard(&self) -> Result<(), IngestError> {
        self.remaining_ms()
            .map_or(Ok(()), |ms| Err(IngestError::TemporarilyBlacklisted { reset_in_ms: ms }))
    }
}

impl IngestConnector for BlacklistConnector {
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
impl HistoryProvider for BlacklistConnector {
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
impl StreamingProvider for BlacklistConnector {
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

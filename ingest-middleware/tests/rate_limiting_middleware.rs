use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingest_core::connector::{HistoryProvider, TimeRange};
use ingest_core::middleware::Middleware;
use ingest_core::{IngestConnector, IngestError, RateLimitTracker};
use ingest_middleware::RateLimitMiddleware;
use ingest_types::{Capability, EventKind, MarketEvent, ProviderDescriptor, RateLimitConfig};

struct StubConnector;

impl IngestConnector for StubConnector {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            key: "stub".to_string(),
            name: "Stub".to_string(),
            supported_asset_classes: vec![],
            capabilities: vec![Capability::History],
            priority: 0,
        }
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        Some(self)
    }
}

#[async_trait]
impl HistoryProvider for StubConnector {
    async fn fetch_history(
        &self,
        _symbol: &str,
        _kind: EventKind,
        _range: TimeRange,
    ) -> Result<Vec<MarketEvent>, IngestError> {
        Ok(vec![])
    }
}

fn any_range() -> TimeRange {
    let now = chrono::Utc::now();
    TimeRange::new(now - chrono::Duration::hours(1), now)
}

#[tokio::test]
async fn exceeding_window_yields_rate_limit_exceeded() {
    let tracker = Arc::new(RateLimitTracker::new());
    let cfg = RateLimitConfig {
        max_requests: 2,
        window: Duration::from_secs(60),
        ..RateLimitConfig::default()
    };
    let wrapped = Box::new(RateLimitMiddleware::new(cfg, Arc::clone(&tracker)))
        .apply(Arc::new(StubConnector));
    let hp = wrapped.as_history_provider().expect("history capability");

    hp.fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect("first call within budget");
    hp.fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect("second call within budget");
    let err = hp
        .fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect_err("third call exceeds the configured window");
    assert!(matches!(err, IngestError::RateLimitExceeded { .. }));
}

#[tokio::test]
async fn shared_tracker_status_is_queryable_independently() {
    let tracker = Arc::new(RateLimitTracker::new());
    let cfg = RateLimitConfig {
        max_requests: 1,
        window: Duration::from_secs(60),
        ..RateLimitConfig::default()
    };
    let wrapped = Box::new(RateLimitMiddleware::new(cfg, Arc::clone(&tracker)))
        .apply(Arc::new(StubConnector));
    let hp = wrapped.as_history_provider().expect("history capability");

    hp.fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect("within budget");
    assert!(tracker.is_rate_limited("stub"));
}

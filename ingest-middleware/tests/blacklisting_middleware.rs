use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ingest_core::connector::{HistoryProvider, TimeRange};
use ingest_core::{IngestConnector, IngestError};
use ingest_middleware::BlacklistConnector;
use ingest_types::{Capability, EventKind, MarketEvent, ProviderDescriptor};

/// Inner connector stub whose `fetch_history` result is controlled by the test.
struct StubConnector {
    next: Mutex<Result<Vec<MarketEvent>, IngestError>>,
}

impl StubConnector {
    fn ok() -> Self {
        Self {
            next: Mutex::new(Ok(vec![])),
        }
    }

    fn set_next(&self, result: Result<Vec<MarketEvent>, IngestError>) {
        *self.next.lock().unwrap() = result;
    }
}

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
        let mut slot = self.next.lock().unwrap();
        std::mem::replace(&mut *slot, Ok(vec![]))
    }
}

fn any_range() -> TimeRange {
    let now = chrono::Utc::now();
    TimeRange::new(now - chrono::Duration::hours(1), now)
}

#[tokio::test]
async fn rate_limit_error_triggers_blacklist() {
    let stub = Arc::new(StubConnector::ok());
    stub.set_next(Err(IngestError::RateLimitExceeded {
        limit: 10,
        window_ms: 60_000,
    }));
    let wrapped = BlacklistConnector::new(stub, Duration::from_secs(60));
    let hp = wrapped.as_history_provider().expect("history capability");

    let err1 = hp
        .fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect_err("should surface the rate-limit error");
    assert!(matches!(err1, IngestError::RateLimitExceeded { .. }));

    let err2 = hp
        .fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect_err("should be blacklisted after the rate-limit hit");
    assert!(matches!(err2, IngestError::TemporarilyBlacklisted { .. }));
}

#[tokio::test]
async fn unauthorized_error_uses_default_duration() {
    let stub = Arc::new(StubConnector::ok());
    stub.set_next(Err(IngestError::Unauthorized {
        provider: "stub".to_string(),
    }));
    let wrapped = BlacklistConnector::new(stub, Duration::from_millis(50));
    let hp = wrapped.as_history_provider().expect("history capability");

    let _ = hp.fetch_history("AAPL", EventKind::Quote, any_range()).await;
    let blocked = hp
        .fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect_err("should be blacklisted");
    assert!(matches!(blocked, IngestError::TemporarilyBlacklisted { .. }));

    tokio::time::sleep(Duration::from_millis(60)).await;
    let result = hp.fetch_history("AAPL", EventKind::Quote, any_range()).await;
    assert!(result.is_ok(), "blacklist should have expired");
}

#[tokio::test]
async fn non_blacklisting_errors_pass_through_untouched() {
    let stub = Arc::new(StubConnector::ok());
    stub.set_next(Err(IngestError::not_found("AAPL")));
    let wrapped = BlacklistConnector::new(stub, Duration::from_secs(60));
    let hp = wrapped.as_history_provider().expect("history capability");

    let err = hp
        .fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect_err("not found propagates");
    assert!(matches!(err, IngestError::NotFound { .. }));

    // Confirms the prior NotFound didn't trip the blacklist gate.
    let _result = hp.fetch_history("AAPL", EventKind::Quote, any_range()).await;
}

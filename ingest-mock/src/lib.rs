//! ingest-mock
//!
//! Deterministic mock connectors for CI-safe tests and examples: a static
//! [`MockConnector`] driven by fixture data, and a [`dynamic::DynamicMockConnector`]
//! whose behavior is scripted at runtime by a paired controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingest_core::connector::{HistoryProvider, StreamingProvider, TimeRange};
use ingest_core::{BoundedPublisher, IngestConnector, IngestError, StreamHandle};
use ingest_types::{Capability, EventKind, MarketEvent, ProviderDescriptor};
use tokio::sync::oneshot;

pub mod dynamic;
mod fixtures;

pub use dynamic::{DynamicMockConnector, DynamicMockController, MockBehavior, StreamBehavior};

/// Mock connector for CI-safe tests and examples. Provides deterministic data
/// from static fixtures, with `FAIL`/`TIMEOUT` symbols special-cased to
/// exercise error paths without an external dependency.
pub struct MockConnector {
    key: &'static str,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Construct a mock connector identified as `"ingest-mock"`.
    #[must_use]
    pub const fn new() -> Self {
        Self { key: "ingest-mock" }
    }

    /// Construct a mock connector under a custom provider key, for tests that
    /// need several distinct mock providers in one routing table.
    #[must_use]
    pub const fn named(key: &'static str) -> Self {
        Self { key }
    }

    async fn maybe_fail_or_timeout(&self, symbol: &str, operation: &'static str) -> Result<(), IngestError> {
        match symbol {
            "FAIL" => Err(IngestError::connector(self.key, format!("forced failure: {operation}"))),
            "TIMEOUT" => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl IngestConnector for MockConnector {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            key: self.key.to_string(),
            name: "Mock Provider".to_string(),
            supported_asset_classes: vec![],
            capabilities: vec![Capability::History, Capability::Streaming],
            priority: 0,
        }
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        Some(self)
    }

    fn as_streaming_provider(&self) -> Option<&dyn StreamingProvider> {
        Some(self)
    }
}

#[async_trait]
impl HistoryProvider for MockConnector {
    async fn fetch_history(
        &self,
        symbol: &str,
        kind: EventKind,
        _range: TimeRange,
    ) -> Result<Vec<MarketEvent>, IngestError> {
        self.maybe_fail_or_timeout(symbol, "fetch_history").await?;
        Ok(fixtures::history(symbol, kind, 10))
    }
}

#[async_trait]
impl StreamingProvider for MockConnector {
    async fn subscribe(
        &self,
        symbols: &[String],
        kind: EventKind,
        sink: Arc<BoundedPublisher>,
    ) -> Result<StreamHandle, IngestError> {
        for symbol in symbols {
            self.maybe_fail_or_timeout(symbol, "subscribe").await?;
        }

        let symbols = symbols.to_vec();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut sequence: u64 = 0;
            let mut ticker = tokio::time::interval(Duration::from_millis(50));
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        for symbol in &symbols {
                            sequence += 1;
                            sink.try_publish(fixtures::tick(symbol, kind, sequence));
                        }
                    }
                }
            }
        });
        Ok(StreamHandle::new(join, stop_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_range() -> TimeRange {
        let now = chrono::Utc::now();
        TimeRange::new(now - chrono::Duration::hours(1), now)
    }

    #[tokio::test]
    async fn history_returns_deterministic_fixtures() {
        let connector = MockConnector::new();
        let hp = connector.as_history_provider().unwrap();
        let events = hp.fetch_history("AAPL", EventKind::Quote, any_range()).await.unwrap();
        assert_eq!(events.len(), 10);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn fail_symbol_yields_connector_error() {
        let connector = MockConnector::new();
        let hp = connector.as_history_provider().unwrap();
        let err = hp
            .fetch_history("FAIL", EventKind::Quote, any_range())
            .await
            .expect_err("FAIL symbol always errors");
        assert!(matches!(err, IngestError::Connector { .. }));
    }

    #[tokio::test]
    async fn subscribe_publishes_ticks_until_stopped() {
        let connector = MockConnector::new();
        let sp = connector.as_streaming_provider().unwrap();
        let publisher = Arc::new(BoundedPublisher::new(64));
        let mut rx = publisher.subscribe();

        let handle = sp
            .subscribe(&["AAPL".to_string()], EventKind::Trade, Arc::clone(&publisher))
            .await
            .unwrap();

        let event = rx.recv().await.expect("tick delivered");
        assert_eq!(event.symbol, "AAPL");
        assert_eq!(event.kind, EventKind::Trade);

        handle.stop().await;
    }
}

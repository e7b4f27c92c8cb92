use chrono::Utc;
use ingest_core::connector::TimeRange;
use ingest_core::{BoundedPublisher, IngestConnector, IngestError};
use ingest_mock::{DynamicMockConnector, MockBehavior, StreamBehavior};
use ingest_types::{EventKind, MarketEvent};
use std::sync::Arc;

fn any_range() -> TimeRange {
    let now = Utc::now();
    TimeRange::new(now - chrono::Duration::hours(1), now)
}

fn event(symbol: &str, seq: u64) -> MarketEvent {
    MarketEvent {
        timestamp: Utc::now(),
        symbol: symbol.to_string(),
        kind: EventKind::Quote,
        payload: serde_json::json!({"seq": seq}),
        sequence: seq,
        source: "dynamic-mock".into(),
        schema_version: 1,
    }
}

#[tokio::test]
async fn unscripted_history_call_is_unsupported() {
    let (connector, _ctrl) = DynamicMockConnector::new_with_controller("dyn1");
    let hp = connector.as_history_provider().unwrap();
    let err = hp
        .fetch_history("AAPL", EventKind::Quote, any_range())
        .await
        .expect_err("no rule registered");
    assert!(matches!(err, IngestError::Unsupported { .. }));
}

#[tokio::test]
async fn scripted_history_behavior_is_honored() {
    let (connector, ctrl) = DynamicMockConnector::new_with_controller("dyn1");
    ctrl.set_history_behavior("AAPL", MockBehavior::Return(vec![event("AAPL", 1)]))
        .await;
    ctrl.set_history_behavior(
        "MSFT",
        MockBehavior::Fail(IngestError::connector("dyn1", "boom")),
    )
    .await;

    let hp = connector.as_history_provider().unwrap();
    let ok = hp.fetch_history("AAPL", EventKind::Quote, any_range()).await.unwrap();
    assert_eq!(ok.len(), 1);

    let err = hp
        .fetch_history("MSFT", EventKind::Quote, any_range())
        .await
        .expect_err("scripted failure");
    assert!(matches!(err, IngestError::Connector { .. }));
}

#[tokio::test]
async fn manual_stream_forwards_pushed_events_to_subscribers() {
    let (connector, ctrl) = DynamicMockConnector::new_with_controller("dyn1");
    ctrl.set_stream_behavior(StreamBehavior::Manual).await;

    let publisher = Arc::new(BoundedPublisher::new(16));
    let mut rx = publisher.subscribe();

    let sp = connector.as_streaming_provider().unwrap();
    let handle = sp
        .subscribe(&["AAPL".to_string()], EventKind::Quote, Arc::clone(&publisher))
        .await
        .expect("manual stream starts");

    assert!(ctrl.push_event(event("AAPL", 1)).await);

    let received = rx.recv().await.expect("event delivered");
    assert_eq!(received.symbol, "AAPL");

    handle.stop().await;
    assert_eq!(ctrl.stream_requests().await, vec![vec!["AAPL".to_string()]]);
}

#[tokio::test]
async fn unscripted_stream_call_is_unsupported() {
    let (connector, _ctrl) = DynamicMockConnector::new_with_controller("dyn1");
    let publisher = Arc::new(BoundedPublisher::new(16));
    let sp = connector.as_streaming_provider().unwrap();
    let err = sp
        .subscribe(&["AAPL".to_string()], EventKind::Quote, publisher)
        .await
        .expect_err("no stream behavior registered");
    assert!(matches!(err, IngestError::Unsupported { .. }));
}

use ingest_core::IngestError;

#[test]
fn flatten_unwraps_nested_aggregates() {
    let nested = IngestError::AllProvidersFailed(vec![
        IngestError::not_found("AAPL"),
        IngestError::AllProvidersFailed(vec![IngestError::connector("polygon", "timeout")]),
    ]);
    let flat = nested.flatten();
    assert_eq!(flat.len(), 2);
    assert!(matches!(flat[0], IngestError::NotFound { .. }));
    assert!(matches!(flat[1], IngestError::Connector { .. }));
}

#[test]
fn not_found_and_unsupported_are_not_actionable() {
    assert!(!IngestError::not_found("AAPL").is_actionable());
    assert!(!IngestError::unsupported("streaming").is_actionable());
    assert!(IngestError::connector("polygon", "boom").is_actionable());
}

#[test]
fn aggregate_is_actionable_if_any_child_is() {
    let agg = IngestError::AllProvidersFailed(vec![
        IngestError::not_found("AAPL"),
        IngestError::connector("polygon", "boom"),
    ]);
    assert!(agg.is_actionable());
}

#[test]
fn rate_limit_classification() {
    assert!(
        IngestError::RateLimitExceeded {
            limit: 100,
            window_ms: 60_000
        }
        .is_rate_limited()
    );
    assert!(
        IngestError::QuotaExceeded {
            remaining: 0,
            reset_in_ms: 1_000
        }
        .is_rate_limited()
    );
    assert!(!IngestError::not_found("AAPL").is_rate_limited());
}

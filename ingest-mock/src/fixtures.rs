//! Deterministic fixture data for [`crate::MockConnector`].

use chrono::{DateTime, TimeZone, Utc};
use ingest_types::{EventKind, MarketEvent};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).single().expect("valid fixture timestamp")
}

/// Generate `count` deterministic events for `symbol`/`kind`, sequenced from 1.
#[must_use]
pub fn history(symbol: &str, kind: EventKind, count: u32) -> Vec<MarketEvent> {
    let start = base_time();
    (0..count)
        .map(|i| {
            let price = 100.0 + f64::from(i) * 0.25;
            MarketEvent {
                timestamp: start + chrono::Duration::minutes(i64::from(i)),
                symbol: symbol.to_string(),
                kind,
                payload: payload_for(kind, price),
                sequence: u64::from(i) + 1,
                source: "ingest-mock".to_string(),
                schema_version: 1,
            }
        })
        .collect()
}

/// A single live tick for `symbol`/`kind` at `sequence`.
#[must_use]
pub fn tick(symbol: &str, kind: EventKind, sequence: u64) -> MarketEvent {
    #[allow(clippy::cast_precision_loss)]
    let price = 100.0 + (sequence % 50) as f64 * 0.1;
    MarketEvent {
        timestamp: Utc::now(),
        symbol: symbol.to_string(),
        kind,
        payload: payload_for(kind, price),
        sequence,
        source: "ingest-mock".to_string(),
        schema_version: 1,
    }
}

fn payload_for(kind: EventKind, price: f64) -> serde_json::Value {
    match kind {
        EventKind::Quote => serde_json::json!({ "bid": price - 0.01, "ask": price + 0.01 }),
        EventKind::Trade => serde_json::json!({ "price": price, "size": 100 }),
        EventKind::Candle => serde_json::json!({
            "open": price, "high": price + 0.5, "low": price - 0.5, "close": price, "volume": 1_000
        }),
        EventKind::OrderBook => serde_json::json!({
            "bids": [[price - 0.01, 100]], "asks": [[price + 0.01, 100]]
        }),
        EventKind::Gap => serde_json::json!({}),
    }
}

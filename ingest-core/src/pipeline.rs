//! Bounded, drop-oldest fan-out of normalized [`MarketEvent`]s from
//! connectors to downstream consumers (storage sink, user subscribers).

use ingest_types::MarketEvent;
use tokio::sync::broadcast;

/// Default per-subscriber queue capacity, matched to
/// [`ingest_types::IngestConfig::publisher_queue_capacity`]'s default.
pub const DEFAULT_CAPACITY: usize = 50_000;

/// Fan-out publisher with independent, bounded, drop-oldest queues per
/// subscriber.
///
/// Built on [`tokio::sync::broadcast`]: each subscriber gets its own ring
/// buffer of `capacity` events. A slow subscriber that falls behind silently
/// skips ahead (observed as [`broadcast::error::RecvError::Lagged`]) rather
/// than applying backpressure to the publisher or to other subscribers.
/// `try_publish` never blocks and never fails because of a full queue; it
/// only errors when there are zero subscribers, which callers may treat as a
/// no-op.
#[derive(Debug)]
pub struct BoundedPublisher {
    tx: broadcast::Sender<MarketEvent>,
}

impl BoundedPublisher {
    /// Create a publisher whose subscribers each buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `event` to all current subscribers without blocking.
    ///
    /// Returns the number of subscribers the event was delivered to. This is
    /// purely informational: delivery to a lagging subscriber still counts
    /// even though that subscriber may subsequently drop older, unconsumed
    /// events to make room.
    pub fn try_publish(&self, event: MarketEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Register a new subscriber with its own bounded queue.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BoundedPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ingest_types::EventKind;

    fn event(seq: u64) -> MarketEvent {
        MarketEvent {
            timestamp: Utc::now(),
            symbol: "AAPL".into(),
            kind: EventKind::Quote,
            payload: serde_json::json!({"seq": seq}),
            sequence: seq,
            source: "mock".into(),
            schema_version: 1,
        }
    }

    #[tokio::test]
    async fn drops_oldest_when_subscriber_lags() {
        let publisher = BoundedPublisher::new(4);
        let mut rx = publisher.subscribe();
        for seq in 0..10 {
            publisher.try_publish(event(seq));
        }
        let mut seen = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(e) => seen.push(e.sequence),
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(seen, vec![6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let publisher = BoundedPublisher::new(4);
        assert_eq!(publisher.try_publish(event(0)), 0);
    }
}

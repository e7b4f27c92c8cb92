//! Streaming client base (C8): drives one provider's streaming connection
//! through [`super::state::ConnectionState`], owns the gated reconnect loop,
//! and queues subscribe/unsubscribe requests made while disconnected.
//!
//! Generalizes this codebase's original supervisor/controller split (one
//! actor per provider, driving a much finer per-instrument phase machine)
//! down to the coarser `subscribe(symbols, kind, sink) -> StreamHandle`
//! surface this engine's connector trait exposes: connect, authenticate, and
//! the first subscription collapse into a single provider call here, so this
//! session only needs to track the state machine's coarse phases around it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ingest_core::{BoundedPublisher, IngestConnector, IngestError, ReconnectGate, StreamHandle};
use ingest_types::{BackoffConfig, EventKind};
use tokio::sync::Mutex;

use super::state::{ConnectionState, Event};

/// Drives a single provider's streaming lifecycle: connect, subscribe,
/// detect disconnection, and reconnect with gated exponential backoff,
/// queuing subscription changes made while offline per `spec.md` §4.7.
pub struct StreamingSession {
    provider_key: String,
    connector: Arc<dyn IngestConnector>,
    sink: Arc<BoundedPublisher>,
    gate: Arc<ReconnectGate>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    handle: Option<StreamHandle>,
    active: BTreeSet<(String, EventKind)>,
    disconnected_at: Option<DateTime<Utc>>,
    gap_sequence: u64,
}

impl StreamingSession {
    /// Create a new, disconnected session for `provider_key` over `connector`.
    #[must_use]
    pub fn new(
        provider_key: impl Into<String>,
        connector: Arc<dyn IngestConnector>,
        sink: Arc<BoundedPublisher>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            provider_key: provider_key.into(),
            connector,
            sink,
            gate: Arc::new(ReconnectGate::new(backoff)),
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                handle: None,
                active: BTreeSet::new(),
                disconnected_at: None,
                gap_sequence: 0,
            }),
        }
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Add `symbol`/`kind` to the active subscription set and (re)open the
    /// stream against the provider's current full set.
    ///
    /// While disconnected, this only updates the desired set; the actual
    /// provider call happens once a reconnect succeeds (queued request).
    ///
    /// # Errors
    /// Returns the provider's `subscribe` error if the session is not
    /// currently disconnected and the provider call fails.
    pub async fn subscribe(&self, symbol: &str, kind: EventKind) -> Result<(), IngestError> {
        let mut inner = self.inner.lock().await;
        inner.active.insert((symbol.to_string(), kind));
        if inner.state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.resubscribe_locked(&mut inner).await
    }

    /// Remove `symbol`/`kind` from the active set and (if still connected)
    /// re-issue the narrowed subscription.
    ///
    /// # Errors
    /// Returns the provider's `subscribe` error if re-subscribing the
    /// narrowed set fails.
    pub async fn unsubscribe(&self, symbol: &str, kind: EventKind) -> Result<(), IngestError> {
        let mut inner = self.inner.lock().await;
        inner.active.remove(&(symbol.to_string(), kind));
        if inner.state == ConnectionState::Disconnected {
            return Ok(());
        }
        if inner.active.is_empty() {
            if let Some(handle) = inner.handle.take() {
                handle.abort();
            }
            inner.state = inner.state.apply(Event::UnsubscribeAll).unwrap_or(ConnectionState::Ready);
            return Ok(());
        }
        self.resubscribe_locked(&mut inner).await
    }

    /// Connect and subscribe to the currently-desired symbol set.
    ///
    /// # Errors
    /// Returns the provider's `subscribe` error on connect failure.
    pub async fn connect(&self) -> Result<(), IngestError> {
        let mut inner = self.inner.lock().await;
        inner.state = inner.state.apply(Event::Connect).unwrap_or(ConnectionState::Connecting);
        self.resubscribe_locked(&mut inner).await
    }

    /// Issue (or re-issue) the provider subscribe call for the entire active
    /// set, in deterministic sorted order (`spec.md` §4.8's requirement that
    /// re-subscription order be stable across failover/reconnect).
    async fn resubscribe_locked(&self, inner: &mut Inner) -> Result<(), IngestError> {
        if inner.active.is_empty() {
            return Ok(());
        }
        let Some(sp) = self.connector.as_streaming_provider() else {
            return Err(IngestError::unsupported("streaming"));
        };
        if let Some(handle) = inner.handle.take() {
            handle.abort();
        }
        // A single provider call carries one event kind; this session tracks
        // exactly one kind at a time, by construction of the router, which
        // opens one `StreamingSession` per (provider, kind).
        let kind = inner.active.iter().next().map(|(_, k)| *k).unwrap_or(EventKind::Quote);
        let symbols: Vec<String> = inner
            .active
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(s, _)| s.clone())
            .collect();

        match sp.subscribe(&symbols, kind, Arc::clone(&self.sink)).await {
            Ok(handle) => {
                inner.handle = Some(handle);
                inner.state = inner
                    .state
                    .apply(Event::TransportOpened)
                    .and_then(|s| s.apply(Event::AuthAcked))
                    .and_then(|s| s.apply(Event::FirstSubscribe))
                    .unwrap_or(ConnectionState::Streaming);
                self.gate.reset();
                Ok(())
            }
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Report that the transport was observed lost (e.g. the provider task
    /// finished unexpectedly).
    pub async fn mark_disconnected(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = inner.state.apply(Event::TransportLost).unwrap_or(ConnectionState::Reconnecting);
        if let Some(handle) = inner.handle.take() {
            handle.abort();
        }
    }

    /// Attempt one gated reconnect. Returns `Ok(true)` on success, `Ok(false)`
    /// if another attempt is already in flight (caller should retry later) or
    /// if this session has given up (`maxAttempts` exhausted), `Err` if the
    /// provider call itself failed (caller should back off the returned
    /// delay before calling again).
    ///
    /// `disconnectedAt` for the eventual gap marker is captured here, at the
    /// start of the first reconnect attempt after a loss, not at the moment
    /// the transport actually dropped (`spec.md` §9, open question 3).
    ///
    /// # Errors
    /// Returns the provider's `subscribe` error for a failed attempt.
    pub async fn try_reconnect(&self) -> Result<bool, IngestError> {
        let Some(guard) = self.gate.try_enter() else {
            return Ok(false);
        };
        if self.gate.exhausted() {
            let mut inner = self.inner.lock().await;
            inner.state = ConnectionState::Disconnected;
            return Ok(false);
        }

        let mut inner = self.inner.lock().await;
        if inner.disconnected_at.is_none() {
            inner.disconnected_at = Some(Utc::now());
        }
        if inner.active.is_empty() {
            inner.state = ConnectionState::Ready;
            return Ok(true);
        }
        match self.resubscribe_locked(&mut inner).await {
            Ok(()) => {
                if let Some(disconnected_at) = inner.disconnected_at.take() {
                    let reconnected_at = Utc::now();
                    inner.gap_sequence += 1;
                    let gap = ingest_types::MarketEvent::gap(
                        inner.active.iter().next().map(|(s, _)| s.clone()).unwrap_or_default(),
                        self.provider_key.clone(),
                        inner.gap_sequence,
                        disconnected_at,
                        reconnected_at,
                    );
                    self.sink.try_publish(gap);
                }
                Ok(true)
            }
            Err(e) => {
                if guard.record_failure_and_next_delay().is_none() {
                    inner.state = ConnectionState::Disconnected;
                }
                Err(e)
            }
        }
    }

    /// True while `maxAttempts` consecutive reconnect failures have occurred.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.gate.exhausted()
    }

    /// Stop the underlying stream entirely, releasing the handle.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.handle.take() {
            handle.stop().await;
        }
        inner.state = ConnectionState::Disconnected;
        inner.active.clear();
    }

    /// Time elapsed since the last-observed disconnection, if any, used by
    /// the failover router to decide whether a consecutive-failure count
    /// should advance.
    pub async fn time_since_disconnect(&self) -> Option<std::time::Duration> {
        let inner = self.inner.lock().await;
        inner.disconnected_at.map(|at| (Utc::now() - at).to_std().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_mock::{DynamicMockConnector, StreamBehavior};

    fn fast_backoff() -> BackoffConfig {
        BackoffConfig {
            base_ms: 1,
            cap_ms: 5,
            factor: 1,
            jitter_min: 1.0,
            jitter_max: 1.0,
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn connect_then_subscribe_reaches_streaming() {
        let (connector, ctrl) = DynamicMockConnector::new_with_controller("alpha");
        ctrl.set_stream_behavior(StreamBehavior::Success(vec![])).await;
        let session = StreamingSession::new("alpha", connector, Arc::new(BoundedPublisher::new(16)), fast_backoff());
        session.subscribe("AAPL", EventKind::Quote).await.unwrap();
        session.connect().await.unwrap();
        assert_eq!(session.state().await, ConnectionState::Streaming);
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_emits_gap_marker() {
        let (connector, ctrl) = DynamicMockConnector::new_with_controller("alpha");
        ctrl.set_stream_behavior(StreamBehavior::Success(vec![])).await;
        let sink = Arc::new(BoundedPublisher::new(16));
        let mut rx = sink.subscribe();
        let session = StreamingSession::new("alpha", connector, Arc::clone(&sink), fast_backoff());
        session.subscribe("AAPL", EventKind::Quote).await.unwrap();
        session.connect().await.unwrap();

        session.mark_disconnected().await;
        assert_eq!(session.state().await, ConnectionState::Reconnecting);

        let reconnected = session.try_reconnect().await.unwrap();
        assert!(reconnected);
        assert_eq!(session.state().await, ConnectionState::Streaming);

        let gap = rx.try_recv().expect("gap marker published");
        assert_eq!(gap.kind, EventKind::Gap);
    }

    #[tokio::test]
    async fn reconnect_gate_rejects_concurrent_callers() {
        let (connector, ctrl) = DynamicMockConnector::new_with_controller("alpha");
        ctrl.set_stream_behavior(StreamBehavior::Fail(IngestError::connector("alpha", "down"))).await;
        let session = Arc::new(StreamingSession::new(
            "alpha",
            connector,
            Arc::new(BoundedPublisher::new(16)),
            fast_backoff(),
        ));
        session.subscribe("AAPL", EventKind::Quote).await.ok();
        session.mark_disconnected().await;

        let a = Arc::clone(&session);
        let b = Arc::clone(&session);
        let (ra, rb) = tokio::join!(tokio::spawn(async move { a.try_reconnect().await }), tokio::spawn(async move {
            b.try_reconnect().await
        }));
        let ra = ra.unwrap();
        let rb = rb.unwrap();
        assert!(matches!(ra, Ok(false)) || matches!(rb, Ok(false)) || ra.is_err() || rb.is_err());
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let (connector, ctrl) = DynamicMockConnector::new_with_controller("alpha");
        ctrl.set_stream_behavior(StreamBehavior::Fail(IngestError::connector("alpha", "down"))).await;
        let session = StreamingSession::new("alpha", connector, Arc::new(BoundedPublisher::new(16)), fast_backoff());
        session.subscribe("AAPL", EventKind::Quote).await.ok();
        session.mark_disconnected().await;
        for _ in 0..3 {
            let _ = session.try_reconnect().await;
        }
        assert!(session.exhausted());
    }
}

//! Failover router (C9): one "active" provider per `(kind)` routing group,
//! switching to the next candidate in `FailoverRule.fallback_order` once a
//! provider's consecutive reconnect failures exceed its configured
//! threshold, per `spec.md` §4.8.

use std::collections::HashMap;
use std::sync::Arc;

use ingest_core::{BoundedPublisher, IngestConnector, IngestError, SubscriptionManager};
use ingest_types::{EventKind, FailoverRule, IngestConfig, Subscription};
use tokio::sync::Mutex;

use super::session::StreamingSession;

/// Logical key this router always presents to `SubscriptionManager`, so
/// subscription ids stay stable across a failover switch even though the
/// underlying provider key changes (`spec.md` §4.8's stable-id requirement).
const ROUTER_PROVIDER_KEY: &str = "router";

struct Group {
    rule: FailoverRule,
    active_index: usize,
    consecutive_failures: u32,
}

/// Routes live subscriptions for one [`EventKind`] across a prioritized list
/// of streaming-capable providers, failing over between them transparently
/// to the caller.
pub struct FailoverRouter {
    kind: EventKind,
    connectors: Vec<Arc<dyn IngestConnector>>,
    sessions: HashMap<String, Arc<StreamingSession>>,
    group: Mutex<Group>,
    subscriptions: Arc<SubscriptionManager>,
    sink: Arc<BoundedPublisher>,
    switch_mutex: Mutex<()>,
}

impl FailoverRouter {
    /// Build a router over `connectors` ordered by `rule.fallback_order`
    /// (with `rule.provider` as the initial active provider).
    #[must_use]
    pub fn new(
        kind: EventKind,
        connectors: Vec<Arc<dyn IngestConnector>>,
        rule: FailoverRule,
        cfg: &IngestConfig,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        let sink = Arc::new(BoundedPublisher::new(cfg.publisher_queue_capacity));
        let mut ordered: Vec<Arc<dyn IngestConnector>> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in std::iter::once(rule.provider.clone()).chain(rule.fallback_order.iter().cloned()) {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(c) = connectors.iter().find(|c| c.descriptor().key == key) {
                ordered.push(Arc::clone(c));
            }
        }

        let sessions = ordered
            .iter()
            .map(|c| {
                let key = c.descriptor().key;
                let session = Arc::new(StreamingSession::new(key.clone(), Arc::clone(c), Arc::clone(&sink), cfg.backoff));
                (key, session)
            })
            .collect();

        Self {
            kind,
            connectors: ordered,
            sessions,
            group: Mutex::new(Group {
                rule,
                active_index: 0,
                consecutive_failures: 0,
            }),
            subscriptions,
            sink,
            switch_mutex: Mutex::new(()),
        }
    }

    /// Subscribers receive normalized events for this router's `kind`
    /// regardless of which provider currently serves them.
    #[must_use]
    pub fn sink(&self) -> Arc<BoundedPublisher> {
        Arc::clone(&self.sink)
    }

    fn active_key(&self, group: &Group) -> Option<String> {
        self.connectors.get(group.active_index).map(|c| c.descriptor().key)
    }

    /// Connect to the currently-active provider.
    ///
    /// # Errors
    /// Returns the active provider's connect error if every provider in
    /// `fallback_order` fails to connect.
    pub async fn connect(&self) -> Result<(), IngestError> {
        let mut group = self.group.lock().await;
        loop {
            let Some(key) = self.active_key(&group) else {
                return Err(IngestError::unsupported("streaming"));
            };
            let Some(session) = self.sessions.get(&key) else {
                return Err(IngestError::connector(&key, "no session registered"));
            };
            match session.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if group.active_index + 1 >= self.connectors.len() {
                        return Err(e);
                    }
                    group.active_index += 1;
                }
            }
        }
    }

    /// Subscribe `symbol` on the currently-active provider, allocating a
    /// stable logical [`Subscription`] id.
    ///
    /// # Errors
    /// Returns the active provider's subscribe error.
    pub async fn subscribe(&self, symbol: &str) -> Result<Subscription, IngestError> {
        let group = self.group.lock().await;
        let key = self.active_key(&group).ok_or_else(|| IngestError::unsupported("streaming"))?;
        drop(group);
        let session = self.sessions.get(&key).ok_or_else(|| IngestError::connector(&key, "no session"))?;
        session.subscribe(symbol, self.kind).await?;
        Ok(self.subscriptions.subscribe(ROUTER_PROVIDER_KEY, symbol, self.kind))
    }

    /// Unsubscribe `symbol` from the currently-active provider.
    ///
    /// # Errors
    /// Returns the active provider's error if re-subscribing the narrowed
    /// set fails.
    pub async fn unsubscribe(&self, symbol: &str) -> Result<(), IngestError> {
        let group = self.group.lock().await;
        let Some(key) = self.active_key(&group) else { return Ok(()) };
        drop(group);
        if let Some(session) = self.sessions.get(&key) {
            session.unsubscribe(symbol, self.kind).await?;
        }
        self.subscriptions.unsubscribe(ROUTER_PROVIDER_KEY, symbol, self.kind);
        Ok(())
    }

    /// Report that the active provider's transport was lost, attempt a gated
    /// reconnect, and trigger failover once `max_consecutive_failures` is
    /// exceeded.
    ///
    /// # Errors
    /// Returns the last attempted provider's error if every candidate in
    /// `fallback_order` has been exhausted.
    pub async fn handle_disconnect(&self) -> Result<(), IngestError> {
        let key = {
            let group = self.group.lock().await;
            self.active_key(&group).ok_or_else(|| IngestError::unsupported("streaming"))?
        };
        let Some(session) = self.sessions.get(&key) else {
            return Err(IngestError::connector(&key, "no session"));
        };
        session.mark_disconnected().await;

        match session.try_reconnect().await {
            Ok(true) => {
                let mut group = self.group.lock().await;
                group.consecutive_failures = 0;
                Ok(())
            }
            Ok(false) if !session.exhausted() => Ok(()),
            _ => self.trigger_failover(&key).await,
        }
    }

    /// Switch the active provider to the next candidate in `fallback_order`,
    /// once `from`'s consecutive failure count exceeds
    /// `max_consecutive_failures`. Serialized so a concurrent caller can't
    /// race two switches at once.
    ///
    /// # Errors
    /// Returns the new active provider's connect error if it also fails, or
    /// an aggregate error if no candidates remain.
    async fn trigger_failover(&self, from: &str) -> Result<(), IngestError> {
        let _permit = self.switch_mutex.lock().await;
        let mut group = self.group.lock().await;
        if self.active_key(&group).as_deref() != Some(from) {
            // Another caller already switched away from `from`.
            return Ok(());
        }
        group.consecutive_failures += 1;
        if group.consecutive_failures < group.rule.max_consecutive_failures {
            return Ok(());
        }
        if group.active_index + 1 >= self.connectors.len() {
            return Err(IngestError::connector(from, "no remaining failover candidates"));
        }
        group.active_index += 1;
        group.consecutive_failures = 0;
        let next_key = self.active_key(&group).expect("just incremented into range");
        drop(group);

        if let Some(old) = self.sessions.get(from) {
            old.disconnect().await;
        }

        // Logical subscriptions live under the router's stable key, not the
        // provider's, so the full carried-over set is just the router's
        // current symbols for this kind.
        let symbols_to_carry = self.subscriptions.symbols_by_kind(ROUTER_PROVIDER_KEY, self.kind);
        let Some(next_session) = self.sessions.get(&next_key) else {
            return Err(IngestError::connector(&next_key, "no session registered"));
        };
        for symbol in &symbols_to_carry {
            if let Err(e) = next_session.subscribe(symbol, self.kind).await {
                tracing_warn(&next_key, symbol, &e);
            }
        }
        next_session.connect().await
    }
}

fn tracing_warn(provider: &str, symbol: &str, err: &IngestError) {
    tracing::warn!(provider, symbol, error = %err, "resubscribe after failover failed for symbol");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_mock::{DynamicMockConnector, StreamBehavior};

    fn rule(primary: &str, fallback: &[&str]) -> FailoverRule {
        FailoverRule {
            provider: primary.to_string(),
            max_consecutive_failures: 1,
            fallback_order: fallback.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn connects_to_primary_when_healthy() {
        let (a, ctrl_a) = DynamicMockConnector::new_with_controller("alpha");
        ctrl_a.set_stream_behavior(StreamBehavior::Success(vec![])).await;
        let (b, _ctrl_b) = DynamicMockConnector::new_with_controller("beta");

        let router = FailoverRouter::new(
            EventKind::Quote,
            vec![a, b],
            rule("alpha", &["beta"]),
            &IngestConfig::default(),
            Arc::new(SubscriptionManager::new()),
        );
        router.subscribe("AAPL").await.unwrap();
        router.connect().await.unwrap();
    }

    #[tokio::test]
    async fn failover_switches_to_next_candidate_after_threshold() {
        let (a, ctrl_a) = DynamicMockConnector::new_with_controller("alpha");
        ctrl_a.set_stream_behavior(StreamBehavior::Fail(IngestError::connector("alpha", "down"))).await;
        let (b, ctrl_b) = DynamicMockConnector::new_with_controller("beta");
        ctrl_b.set_stream_behavior(StreamBehavior::Success(vec![])).await;

        let router = FailoverRouter::new(
            EventKind::Quote,
            vec![a, b],
            rule("alpha", &["beta"]),
            &IngestConfig::default(),
            Arc::new(SubscriptionManager::new()),
        );
        router.subscribe("AAPL").await.ok();
        // Primary connect fails outright during initial connect, which
        // already advances past it in `connect()`'s own fallback loop.
        router.connect().await.unwrap();

        let group = router.group.lock().await;
        assert_eq!(router.active_key(&group), Some("beta".to_string()));
    }

    #[tokio::test]
    async fn subscription_id_is_stable_across_failover() {
        let (a, ctrl_a) = DynamicMockConnector::new_with_controller("alpha");
        ctrl_a.set_stream_behavior(StreamBehavior::Success(vec![])).await;
        let (b, ctrl_b) = DynamicMockConnector::new_with_controller("beta");
        ctrl_b.set_stream_behavior(StreamBehavior::Success(vec![])).await;

        let router = FailoverRouter::new(
            EventKind::Quote,
            vec![a, b],
            rule("alpha", &["beta"]),
            &IngestConfig::default(),
            Arc::new(SubscriptionManager::new()),
        );
        let first = router.subscribe("AAPL").await.unwrap();
        router.connect().await.unwrap();

        // Drive an actual failover away from "alpha" without ever
        // unsubscribing the logical subscription.
        router.trigger_failover("alpha").await.unwrap();
        {
            let group = router.group.lock().await;
            assert_eq!(router.active_key(&group), Some("beta".to_string()));
        }

        let second = router.subscribe("AAPL").await.unwrap();
        assert_eq!(first.id, second.id);
    }
}

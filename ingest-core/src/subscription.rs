//! Dense subscription id allocation, scoped per provider.
//!
//! Each provider gets a disjoint block of ids starting at a well-known
//! offset (`provider_index * BLOCK_SIZE`), so ids remain stable and
//! human-debuggable ("subscription 200001 belongs to provider 2") without a
//! global counter shared across providers.

use std::collections::HashMap;
use std::sync::Mutex;

use ingest_types::{EventKind, Subscription};

/// Size of the id block reserved per provider.
pub const BLOCK_SIZE: u64 = 100_000;

#[derive(Debug, Default)]
struct ProviderState {
    next_offset: u64,
    by_key: HashMap<(String, EventKind), u64>,
}

/// Tracks active subscriptions and allocates stable, dense ids for them.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    providers: Mutex<HashMap<String, ProviderState>>,
    provider_order: Mutex<Vec<String>>,
}

impl SubscriptionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn provider_block_base(order: &mut Vec<String>, provider: &str) -> u64 {
        let idx = order.iter().position(|p| p == provider).unwrap_or_else(|| {
            order.push(provider.to_string());
            order.len() - 1
        });
        idx as u64 * BLOCK_SIZE
    }

    /// Subscribe `symbol`/`kind` on `provider`, returning the subscription.
    ///
    /// Idempotent: calling this again with the same `(provider, symbol,
    /// kind)` returns the existing subscription id rather than allocating a
    /// new one.
    pub fn subscribe(&self, provider: &str, symbol: &str, kind: EventKind) -> Subscription {
        let mut order = self.provider_order.lock().unwrap_or_else(|e| e.into_inner());
        let base = Self::provider_block_base(&mut order, provider);
        drop(order);

        let mut providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        let state = providers.entry(provider.to_string()).or_default();
        let key = (symbol.to_string(), kind);
        let id = if let Some(existing) = state.by_key.get(&key) {
            *existing
        } else {
            let id = base + state.next_offset;
            state.next_offset += 1;
            state.by_key.insert(key, id);
            id
        };
        Subscription {
            id,
            provider: provider.to_string(),
            symbol: symbol.to_string(),
            kind,
        }
    }

    /// Remove a previously registered subscription. A no-op if it was never
    /// subscribed (or was already unsubscribed).
    pub fn unsubscribe(&self, provider: &str, symbol: &str, kind: EventKind) {
        let mut providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = providers.get_mut(provider) {
            state.by_key.remove(&(symbol.to_string(), kind));
        }
    }

    /// All symbols currently subscribed on `provider` for `kind`.
    #[must_use]
    pub fn symbols_by_kind(&self, provider: &str, kind: EventKind) -> Vec<String> {
        let providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        providers
            .get(provider)
            .map(|state| {
                state
                    .by_key
                    .keys()
                    .filter(|(_, k)| *k == kind)
                    .map(|(sym, _)| sym.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent() {
        let mgr = SubscriptionManager::new();
        let a = mgr.subscribe("alpaca", "AAPL", EventKind::Quote);
        let b = mgr.subscribe("alpaca", "AAPL", EventKind::Quote);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn providers_get_disjoint_id_blocks() {
        let mgr = SubscriptionManager::new();
        let a = mgr.subscribe("alpaca", "AAPL", EventKind::Quote);
        let b = mgr.subscribe("polygon", "AAPL", EventKind::Quote);
        assert!(a.id < BLOCK_SIZE);
        assert!(b.id >= BLOCK_SIZE);
    }

    #[test]
    fn unsubscribe_then_resubscribe_reallocates() {
        let mgr = SubscriptionManager::new();
        let a = mgr.subscribe("alpaca", "AAPL", EventKind::Quote);
        mgr.unsubscribe("alpaca", "AAPL", EventKind::Quote);
        let b = mgr.subscribe("alpaca", "AAPL", EventKind::Quote);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn symbols_by_kind_filters_correctly() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe("alpaca", "AAPL", EventKind::Quote);
        mgr.subscribe("alpaca", "MSFT", EventKind::Trade);
        let symbols = mgr.symbols_by_kind("alpaca", EventKind::Quote);
        assert_eq!(symbols, vec!["AAPL".to_string()]);
    }
}

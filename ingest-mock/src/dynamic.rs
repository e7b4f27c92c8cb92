//! A connector whose behavior is scripted at runtime via a paired controller,
//! for tests that need to drive specific failure/retry/reconnect sequences.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ingest_core::connector::{HistoryProvider, StreamingProvider, TimeRange};
use ingest_core::{BoundedPublisher, IngestConnector, IngestError, StreamHandle};
use ingest_types::{Capability, EventKind, MarketEvent, ProviderDescriptor};
use tokio::sync::{Mutex, mpsc, oneshot};

/// Instruction for how a method should behave for a given input.
#[derive(Clone)]
pub enum MockBehavior<T> {
    /// Return the provided value immediately.
    Return(T),
    /// Fail immediately with the provided error.
    Fail(IngestError),
    /// Hang indefinitely (simulate a stalled call).
    Hang,
}

/// Instruction for how a streaming session should behave.
#[derive(Clone)]
pub enum StreamBehavior {
    /// Start a session and publish these events (filtered to subscribed symbols).
    Success(Vec<MarketEvent>),
    /// Fail the `subscribe` call immediately.
    Fail(IngestError),
    /// Hang the `subscribe` call (simulate a stalled connect).
    Hang,
    /// Start a session that accepts external events via `push_event`.
    Manual,
}

struct StreamController {
    behavior: StreamBehavior,
    kill_switch: Option<oneshot::Sender<()>>,
    manual_tx: Option<mpsc::Sender<MarketEvent>>,
}

impl StreamController {
    const fn new(behavior: StreamBehavior) -> Self {
        Self {
            behavior,
            kill_switch: None,
            manual_tx: None,
        }
    }
}

#[derive(Default)]
struct InternalState {
    history_rules: HashMap<String, MockBehavior<Vec<MarketEvent>>>,
    stream_requests: Vec<Vec<String>>,
    stream_controller: Option<StreamController>,
}

/// Controller handle used by tests to drive a [`DynamicMockConnector`] from the outside.
pub struct DynamicMockController {
    state: Arc<Mutex<InternalState>>,
}

impl DynamicMockController {
    /// Set the behavior for `fetch_history` calls for a specific symbol.
    pub async fn set_history_behavior(&self, symbol: impl Into<String>, behavior: MockBehavior<Vec<MarketEvent>>) {
        let mut guard = self.state.lock().await;
        guard.history_rules.insert(symbol.into(), behavior);
    }

    /// Set the behavior for the connector's streaming session.
    pub async fn set_stream_behavior(&self, behavior: StreamBehavior) {
        let mut guard = self.state.lock().await;
        guard.stream_controller = Some(StreamController::new(behavior));
    }

    /// Remotely kill the active streaming session, if any.
    pub async fn kill_stream(&self) {
        let mut guard = self.state.lock().await;
        if let Some(ctrl) = guard.stream_controller.as_mut()
            && let Some(tx) = ctrl.kill_switch.take()
        {
            let _ = tx.send(());
        }
    }

    /// Push a single event into an active `Manual` streaming session.
    ///
    /// Returns `true` if the event was queued, `false` if no manual session
    /// is active or the channel is closed.
    pub async fn push_event(&self, event: MarketEvent) -> bool {
        let tx_opt = {
            let guard = self.state.lock().await;
            guard.stream_controller.as_ref().and_then(|c| c.manual_tx.clone())
        };
        match tx_opt {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Symbol sets requested across every `subscribe` call so far.
    pub async fn stream_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().await.stream_requests.clone()
    }

    /// Clear all configured behaviors and request logs.
    pub async fn clear_all_behaviors(&self) {
        let mut guard = self.state.lock().await;
        guard.history_rules.clear();
        guard.stream_requests.clear();
        guard.stream_controller = None;
    }
}

/// A connector that defers all behavior to an external, test-driven controller.
pub struct DynamicMockConnector {
    key: &'static str,
    capabilities: Vec<Capability>,
    state: Arc<Mutex<InternalState>>,
}

impl DynamicMockConnector {
    /// Create a new dynamic mock connector and its paired controller,
    /// advertising every capability so tests don't need to opt in to gating
    /// individually. Use [`Self::new_with_controller_capabilities`] to build
    /// a connector restricted to a specific capability set.
    #[must_use]
    pub fn new_with_controller(key: &'static str) -> (Arc<dyn IngestConnector>, DynamicMockController) {
        Self::new_with_controller_capabilities(
            key,
            vec![
                Capability::History,
                Capability::Streaming,
                Capability::AdjustedPrices,
                Capability::Intraday,
                Capability::Dividends,
                Capability::Splits,
                Capability::Quotes,
                Capability::Trades,
                Capability::Depth,
            ],
        )
    }

    /// Create a new dynamic mock connector restricted to `capabilities`, for
    /// tests exercising capability gating (e.g. a provider that lacks
    /// `AdjustedPrices`).
    #[must_use]
    pub fn new_with_controller_capabilities(
        key: &'static str,
        capabilities: Vec<Capability>,
    ) -> (Arc<dyn IngestConnector>, DynamicMockController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let controller = DynamicMockController {
            state: Arc::clone(&state),
        };
        let me = Arc::new(Self { key, capabilities, state });
        (me as Arc<dyn IngestConnector>, controller)
    }
}

impl IngestConnector for DynamicMockConnector {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            key: self.key.to_string(),
            name: "Dynamic Mock Provider".to_string(),
            supported_asset_classes: vec![],
            capabilities: self.capabilities.clone(),
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
impl HistoryProvider for DynamicMockConnector {
    async fn fetch_history(
        &self,
        symbol: &str,
        _kind: EventKind,
        _range: TimeRange,
    ) -> Result<Vec<MarketEvent>, IngestError> {
        let behavior = {
            let guard = self.state.lock().await;
            guard.history_rules.get(symbol).cloned()
        };
        match behavior {
            Some(MockBehavior::Return(events)) => Ok(events),
            Some(MockBehavior::Fail(e)) => Err(e),
            Some(MockBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(IngestError::unsupported("fetch_history")),
        }
    }
}

#[async_trait]
impl StreamingProvider for DynamicMockConnector {
    async fn subscribe(
        &self,
        symbols: &[String],
        _kind: EventKind,
        sink: Arc<BoundedPublisher>,
    ) -> Result<StreamHandle, IngestError> {
        {
            let mut guard = self.state.lock().await;
            guard.stream_requests.push(symbols.to_vec());
        }

        let behavior = {
            let guard = self.state.lock().await;
            guard.stream_controller.as_ref().map(|c| c.behavior.clone())
        };

        match behavior {
            Some(StreamBehavior::Fail(e)) => Err(e),
            Some(StreamBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(StreamBehavior::Manual) => {
                let allow: std::collections::HashSet<String> = symbols.iter().cloned().collect();
                let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
                let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
                let (in_tx, mut in_rx) = mpsc::channel::<MarketEvent>(1024);

                {
                    let mut guard = self.state.lock().await;
                    let entry = guard
                        .stream_controller
                        .get_or_insert_with(|| StreamController::new(StreamBehavior::Manual));
                    entry.kill_switch = Some(kill_tx);
                    entry.manual_tx = Some(in_tx);
                }

                let join = tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut stop_rx => break,
                            _ = &mut kill_rx => break,
                            maybe_event = in_rx.recv() => {
                                match maybe_event {
                                    Some(event) if allow.is_empty() || allow.contains(&event.symbol) => {
                                        sink.try_publish(event);
                                    }
                                    Some(_) => {}
                                    None => {
                                        tokio::select! {
                                            _ = &mut stop_rx => {}
                                            _ = &mut kill_rx => {}
                                        }
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
                Ok(StreamHandle::new(join, stop_tx))
            }
            Some(StreamBehavior::Success(events)) => {
                let allow: std::collections::HashSet<String> = symbols.iter().cloned().collect();
                let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
                let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

                {
                    let mut guard = self.state.lock().await;
                    let entry = guard
                        .stream_controller
                        .get_or_insert_with(|| StreamController::new(StreamBehavior::Success(Vec::new())));
                    entry.kill_switch = Some(kill_tx);
                    entry.manual_tx = None;
                }

                let join = tokio::spawn(async move {
                    for event in events {
                        if stop_rx.try_recv().is_ok() || kill_rx.try_recv().is_ok() {
                            return;
                        }
                        if !allow.is_empty() && !allow.contains(&event.symbol) {
                            continue;
                        }
                        sink.try_publish(event);
                    }
                    tokio::select! {
                        _ = &mut stop_rx => {}
                        _ = &mut kill_rx => {}
                    }
                });
                Ok(StreamHandle::new(join, stop_tx))
            }
            None => Err(IngestError::unsupported("subscribe")),
        }
    }
}

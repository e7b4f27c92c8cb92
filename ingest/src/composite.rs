//! Composite historical provider (C7): priority- and rate-aware ordering,
//! failover across providers, and optional cross-validation.
//!
//! Generalizes this codebase's original `Borsa`/`BorsaBuilder` orchestrator
//! (single-capability fetch/fallback over a connector list) down to the one
//! capability this engine's historical side needs: `fetch_history`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ingest_core::connector::TimeRange;
use ingest_core::{Cancellable, IngestConnector, IngestError, RateLimitTracker};
use ingest_types::{Capability, EventKind, IngestConfig, MarketEvent, ProviderDescriptor};
use tokio_util::sync::CancellationToken;

/// A provider key paired with its static descriptor, cached at registration
/// time so ordering doesn't re-ask every connector on every call.
struct Registered {
    connector: Arc<dyn IngestConnector>,
    descriptor: ProviderDescriptor,
}

/// Resolves a caller-facing symbol to a provider-specific one. Most providers
/// accept the input symbol unchanged; a resolver is only needed for
/// providers with idiosyncratic symbology.
pub trait SymbolResolver: Send + Sync {
    /// Map `input` to the symbol `provider` expects.
    fn resolve(&self, provider: &str, input: &str) -> String;
}

struct IdentityResolver;
impl SymbolResolver for IdentityResolver {
    fn resolve(&self, _provider: &str, input: &str) -> String {
        input.to_string()
    }
}

/// Routes historical fetches across registered providers per `spec.md` §4.6:
/// failure-backoff exclusion, rate-aware rotation, cross-validation, and the
/// capped all-rate-limited recursive retry.
pub struct CompositeHistoryProvider {
    providers: Vec<Registered>,
    rate_limiter: Arc<RateLimitTracker>,
    cfg: IngestConfig,
    /// Provider key -> instant after which it is eligible again, set on any
    /// non-rate-limit failure.
    backoff_until: Mutex<HashMap<String, Instant>>,
    symbol_resolver: Arc<dyn SymbolResolver>,
}

impl CompositeHistoryProvider {
    /// Build a composite over `connectors`, registering each with a shared
    /// rate-limit tracker under `cfg.rate_limit`.
    #[must_use]
    pub fn new(connectors: Vec<Arc<dyn IngestConnector>>, cfg: IngestConfig) -> Self {
        Self::with_symbol_resolver(connectors, cfg, Arc::new(IdentityResolver))
    }

    /// Build a composite with a custom symbol resolver for providers whose
    /// symbology differs from the caller-facing symbol.
    #[must_use]
    pub fn with_symbol_resolver(
        connectors: Vec<Arc<dyn IngestConnector>>,
        cfg: IngestConfig,
        symbol_resolver: Arc<dyn SymbolResolver>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimitTracker::new());
        let providers = connectors
            .into_iter()
            .filter(|c| c.supports(Capability::History))
            .map(|connector| {
                let descriptor = connector.descriptor();
                rate_limiter.register_provider(&descriptor.key, cfg.rate_limit.clone());
                Registered { connector, descriptor }
            })
            .collect();
        Self {
            providers,
            rate_limiter,
            cfg,
            backoff_until: Mutex::new(HashMap::new()),
            symbol_resolver,
        }
    }

    /// Union of capabilities across every registered child (`spec.md` §4.6
    /// "capability aggregation"): used by callers deciding whether this
    /// composite is worth querying at all for a given capability.
    #[must_use]
    pub fn aggregate_capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self
            .providers
            .iter()
            .flat_map(|r| r.descriptor.capabilities.iter().copied())
            .collect();
        caps.sort_by_key(|c| format!("{c}"));
        caps.dedup();
        caps
    }

    /// Fetch historical events for `symbol`/`kind` within `range`, trying
    /// providers in priority/rate-aware order until one succeeds or every
    /// eligible provider has been tried.
    ///
    /// # Errors
    /// Returns [`Cancellable::Cancelled`] if `ct` trips before completion, or
    /// [`Cancellable::Failed`] with an aggregate [`IngestError`] if every
    /// eligible provider fails. An empty result from every provider is `Ok`
    /// with an empty vector, not an error.
    pub async fn fetch_history(
        &self,
        symbol: &str,
        kind: EventKind,
        range: TimeRange,
        ct: &CancellationToken,
    ) -> Result<Vec<MarketEvent>, Cancellable<IngestError>> {
        self.fetch_history_inner(symbol, kind, range, ct, false, false).await
    }

    /// Fetch split/dividend-adjusted daily bars for `symbol` within `range`,
    /// per `spec.md` §4.5's capability gating: only providers advertising
    /// [`Capability::AdjustedPrices`] are considered. If none of them
    /// succeed (including the case where none exist at all), falls back to
    /// plain daily bars via [`Self::fetch_history`], projected as
    /// trivially-adjusted.
    ///
    /// # Errors
    /// Returns [`Cancellable::Cancelled`] if `ct` trips before completion, or
    /// the plain `fetch_history` fallback's error if that also fails.
    pub async fn fetch_adjusted_daily_bars(
        &self,
        symbol: &str,
        range: TimeRange,
        ct: &CancellationToken,
    ) -> Result<Vec<MarketEvent>, Cancellable<IngestError>> {
        match self
            .fetch_history_inner(symbol, EventKind::Candle, range, ct, false, true)
            .await
        {
            Ok(events) => Ok(events),
            Err(Cancellable::Cancelled) => Err(Cancellable::Cancelled),
            Err(Cancellable::Failed(_)) => {
                tracing::debug!(symbol, "no adjusted-prices-capable provider succeeded, falling back to trivially-adjusted daily bars");
                self.fetch_history(symbol, EventKind::Candle, range, ct).await
            }
        }
    }

    async fn fetch_history_inner(
        &self,
        symbol: &str,
        kind: EventKind,
        range: TimeRange,
        ct: &CancellationToken,
        retried: bool,
        adjusted: bool,
    ) -> Result<Vec<MarketEvent>, Cancellable<IngestError>> {
        let order = if adjusted {
            self.ordered_candidates_matching(|d| d.supports(Capability::AdjustedPrices))
        } else {
            self.ordered_candidates_matching(|_| true)
        };
        if order.is_empty() {
            return Err(Cancellable::Failed(IngestError::unsupported("history")));
        }

        let mut errors: Vec<IngestError> = Vec::new();
        for key in order {
            if ct.is_cancelled() {
                return Err(Cancellable::Cancelled);
            }
            let Some(reg) = self.providers.iter().find(|r| r.descriptor.key == key) else {
                continue;
            };
            let Some(hp) = reg.connector.as_history_provider() else {
                continue;
            };

            let provider_symbol = self.symbol_resolver.resolve(&key, symbol);
            self.rate_limiter.record_request(&key);

            let started = Instant::now();
            let call = if adjusted {
                hp.fetch_adjusted_history(&provider_symbol, kind, range)
            } else {
                hp.fetch_history(&provider_symbol, kind, range)
            };
            let outcome = tokio::select! {
                biased;
                () = ct.cancelled() => return Err(Cancellable::Cancelled),
                res = call => res,
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(events) => {
                    self.rate_limiter.clear_rate_limit_state(&key);
                    self.clear_backoff(&key);
                    if self.cfg.composite.enable_cross_validation && !events.is_empty() {
                        self.spawn_cross_validation(&key, symbol, kind, range, &events);
                    }
                    tracing_info(&key, elapsed);
                    return Ok(events);
                }
                Err(e) if detect_retry_after(&e).is_some() => {
                    let retry_after = detect_retry_after(&e).unwrap_or(Duration::from_secs(60));
                    self.rate_limiter.record_rate_limit_hit(&key, retry_after);
                    errors.push(e);
                }
                Err(IngestError::NotFound { what }) => {
                    errors.push(IngestError::NotFound { what });
                }
                Err(e) => {
                    self.start_backoff(&key);
                    errors.push(tag_provider(&key, e));
                }
            }
        }

        if errors.is_empty() {
            return Ok(Vec::new());
        }

        if !retried && errors.iter().all(|e| detect_retry_after(e).is_some()) {
            let shortest = self.shortest_reset_among(&errors);
            if shortest < Duration::from_secs(5 * 60) {
                tokio::select! {
                    biased;
                    () = ct.cancelled() => return Err(Cancellable::Cancelled),
                    () = tokio::time::sleep(shortest) => {}
                }
                return Box::pin(self.fetch_history_inner(symbol, kind, range, ct, true, adjusted)).await;
            }
            return Err(Cancellable::Failed(IngestError::AllProvidersFailed(errors)));
        }

        if errors.iter().all(|e| matches!(e, IngestError::NotFound { .. })) {
            return Err(Cancellable::Failed(IngestError::not_found(format!(
                "history for {symbol}"
            ))));
        }

        Err(Cancellable::Failed(IngestError::AllProvidersFailed(errors)))
    }

    fn shortest_reset_among(&self, errors: &[IngestError]) -> Duration {
        errors
            .iter()
            .filter_map(detect_retry_after)
            .min()
            .unwrap_or_else(|| {
                self.providers
                    .iter()
                    .filter_map(|r| self.rate_limiter.time_until_reset(&r.descriptor.key))
                    .min()
                    .unwrap_or(Duration::from_secs(5 * 60))
            })
    }

    /// Order providers per `spec.md` §4.6: restrict to those matching
    /// `filter` (a capability gate, or `|_| true` for none), exclude
    /// in-backoff providers, then (if rotation is enabled) sort by
    /// rate-limit-aware score, falling back to descriptor priority as the
    /// tiebreak.
    fn ordered_candidates_matching(&self, filter: impl Fn(&ProviderDescriptor) -> bool) -> Vec<String> {
        let now = Instant::now();
        let mut eligible: Vec<&Registered> = {
            let backoff = self.backoff_until.lock().unwrap_or_else(|e| e.into_inner());
            self.providers
                .iter()
                .filter(|r| filter(&r.descriptor))
                .filter(|r| !backoff.get(&r.descriptor.key).is_some_and(|until| *until > now))
                .collect()
        };

        if self.cfg.composite.enable_rate_limit_rotation {
            eligible.sort_by(|a, b| {
                let score_a = self.rotation_score(&a.descriptor);
                let score_b = self.rotation_score(&b.descriptor);
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.descriptor.priority.cmp(&b.descriptor.priority))
            });
        } else {
            eligible.sort_by_key(|r| r.descriptor.priority);
        }

        eligible.into_iter().map(|r| r.descriptor.key.clone()).collect()
    }

    fn rotation_score(&self, descriptor: &ProviderDescriptor) -> f64 {
        if self.rate_limiter.is_rate_limited(&descriptor.key) {
            1000.0
        } else if self.rate_limiter.is_approaching_limit(&descriptor.key) {
            let usage = self
                .rate_limiter
                .status(&descriptor.key)
                .map_or(0.0, |s| s.usage_ratio * 100.0);
            100.0 + usage
        } else {
            f64::from(descriptor.priority)
        }
    }

    fn start_backoff(&self, key: &str) {
        let mut backoff = self.backoff_until.lock().unwrap_or_else(|e| e.into_inner());
        backoff.insert(
            key.to_string(),
            Instant::now() + self.cfg.composite.failure_backoff_duration,
        );
    }

    fn clear_backoff(&self, key: &str) {
        self.backoff_until.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    /// Cross-validation per `spec.md` §4.6/§9: compares the first 5 bars by
    /// index (not by date — kept as the source behaves; see DESIGN.md open
    /// question #2) against a second provider and logs discrepancies where
    /// `|delta close| / close > 1%`. Best-effort: runs detached and never
    /// affects the caller's result.
    fn spawn_cross_validation(
        &self,
        source_key: &str,
        symbol: &str,
        kind: EventKind,
        range: TimeRange,
        source_events: &[MarketEvent],
    ) {
        let Some(validator) = self
            .providers
            .iter()
            .find(|r| r.descriptor.key != source_key && r.connector.as_history_provider().is_some())
        else {
            return;
        };
        let connector = Arc::clone(&validator.connector);
        let validator_key = validator.descriptor.key.clone();
        let symbol = symbol.to_string();
        let source_key = source_key.to_string();
        let source_sample: Vec<MarketEvent> = source_events.iter().take(5).cloned().collect();

        tokio::spawn(async move {
            let Some(hp) = connector.as_history_provider() else { return };
            let Ok(validation_events) = hp.fetch_history(&symbol, kind, range).await else {
                return;
            };
            for (i, source_evt) in source_sample.iter().enumerate() {
                let Some(validation_evt) = validation_events.get(i) else { break };
                let Some(source_close) = source_evt.payload.get("close").and_then(serde_json::Value::as_f64) else { continue };
                let Some(validation_close) = validation_evt.payload.get("close").and_then(serde_json::Value::as_f64) else { continue };
                if source_close == 0.0 {
                    continue;
                }
                let delta_ratio = (validation_close - source_close).abs() / source_close;
                if delta_ratio > 0.01 {
                    log_discrepancy(&source_key, &validator_key, &symbol, i, source_close, validation_close);
                }
            }
        });
    }
}

fn tracing_info(provider: &str, elapsed: Duration) {
    tracing::debug!(provider, elapsed_ms = elapsed.as_millis() as u64, "history fetch succeeded");
}

fn log_discrepancy(source: &str, validator: &str, symbol: &str, index: usize, source_close: f64, validation_close: f64) {
    tracing::warn!(source, validator, symbol, index, source_close, validation_close, "cross-validation discrepancy");
}

fn tag_provider(key: &str, e: IngestError) -> IngestError {
    match e {
        e @ (IngestError::NotFound { .. }
        | IngestError::ProviderTimeout { .. }
        | IngestError::RequestTimeout { .. }
        | IngestError::AllProvidersTimedOut { .. }
        | IngestError::AllProvidersFailed(_)) => e,
        other => IngestError::connector(key, other.to_string()),
    }
}

/// Parse a provider error's Retry-After hint, per `spec.md` §4.6's failure
/// classification: structured field preferred, string pattern as a
/// last-resort fallback (kept as a named, separately testable function per
/// the design note in `spec.md` §9 against using exceptions as flow control).
///
/// `Some(_)` doubles as the rate-limit classification signal itself: per
/// §4.6 a message "containing `429`, `rate limit`, or `too many requests`,
/// case-insensitive" is a rate-limit signal even on an untyped
/// `Connector`/`Other`/`Io` error, not just on the three typed
/// rate-limit/quota/blacklist variants.
fn detect_retry_after(err: &IngestError) -> Option<Duration> {
    match err {
        IngestError::RateLimitExceeded { window_ms, .. } => Some(Duration::from_millis(*window_ms)),
        IngestError::QuotaExceeded { reset_in_ms, .. } => Some(Duration::from_millis(*reset_in_ms)),
        IngestError::TemporarilyBlacklisted { reset_in_ms } => Some(Duration::from_millis(*reset_in_ms)),
        IngestError::Connector { msg, .. } | IngestError::Other(msg) | IngestError::Io(msg) => {
            parse_retry_after_from_message(msg)
        }
        _ => None,
    }
}

/// Last-resort string sniff for a `retry-after:\s*(\d+)` hint in a free-text
/// error message, plus a bare `429`/`rate limit`/`too many requests` signal
/// treated as "rate limited, no explicit duration".
fn parse_retry_after_from_message(msg: &str) -> Option<Duration> {
    let lower = msg.to_lowercase();
    if let Some(idx) = lower.find("retry-after") {
        let tail = &lower[idx..];
        let digits: String = tail
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(secs) = digits.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
    }
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(Duration::from_secs(60));
    }
    None
}

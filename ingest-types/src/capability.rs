use core::fmt;
use serde::{Deserialize, Serialize};

/// High-level capability labels for routing, errors, and telemetry.
///
/// A provider reports which of these it implements; composite routing only
/// considers providers that declare the capability a request needs.
///
/// `History` and `Streaming` are the two broad connector *roles* (whether a
/// connector implements `HistoryProvider`/`StreamingProvider` at all, per
/// [`crate::ProviderDescriptor::supports`]). The rest are finer-grained
/// feature flags a `History`-role provider may additionally advertise, used
/// for per-call gating (`spec.md` §4.5/§4.6's capability set:
/// `adjustedPrices, intraday, dividends, splits, quotes, trades, depth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Point-in-time and historical OHLCV retrieval (pull-based).
    History,
    /// Live push-based market data (quotes, trades, candles, order book deltas).
    Streaming,
    /// Split/dividend-adjusted daily bars (`getAdjustedDailyBars`).
    AdjustedPrices,
    /// Sub-daily (intraday) historical bars.
    Intraday,
    /// Historical dividend events.
    Dividends,
    /// Historical stock split events.
    Splits,
    /// Live quote (top-of-book) streaming.
    Quotes,
    /// Live trade-print streaming.
    Trades,
    /// Live order book depth streaming.
    Depth,
}

impl Capability {
    /// Stable, kebab-case identifier for logs/errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Streaming => "streaming",
            Self::AdjustedPrices => "adjusted-prices",
            Self::Intraday => "intraday",
            Self::Dividends => "dividends",
            Self::Splits => "splits",
            Self::Quotes => "quotes",
            Self::Trades => "trades",
            Self::Depth => "depth",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of payload carried by a [`crate::model::MarketEvent`] or requested by a
/// [`crate::model::Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Top-of-book bid/ask quote.
    Quote,
    /// An executed trade print.
    Trade,
    /// An OHLCV candle/bar close.
    Candle,
    /// An incremental order book update.
    OrderBook,
    /// A synthetic gap marker emitted after a reconnect, spanning the outage.
    Gap,
}

impl EventKind {
    /// Stable, camelCase identifier used in the wire/storage schema.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Trade => "trade",
            Self::Candle => "candle",
            Self::OrderBook => "orderBook",
            Self::Gap => "gap",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

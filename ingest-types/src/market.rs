//! Minimal asset/venue classification used by routing and provider descriptors.
//!
//! The ingestion engine does not model instrument reference data; these are
//! routing-only labels, not a securities master.

use serde::{Deserialize, Serialize};

/// Broad asset class used to scope provider rules and descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    /// Listed equities and ETFs.
    Equity,
    /// Spot and perpetual crypto markets.
    Crypto,
    /// Spot and forward foreign exchange pairs.
    Forex,
    /// Listed futures and options on futures.
    Future,
}

/// A trading venue or feed source, identified by its short code (e.g. `"NASDAQ"`,
/// `"BINANCE"`). Kept as an opaque newtype rather than a closed enum since the
/// set of venues is operator-configured, not fixed at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exchange(pub String);

impl Exchange {
    /// Construct a new exchange label.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the exchange code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Exchange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Exchange {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

//! Builder for composing connectors with middleware layers.
//!
//! # Middleware Ordering Convention
//!
//! Middleware layers form an "onion" around the raw connector:
//!
//! ```text
//! User Request
//!     ↓
//! Outermost Middleware (Blacklist - checks first, handles errors last)
//!     ↓
//! Inner Middleware (RateLimit - enforces windows, records usage)
//!     ↓
//! Raw Connector (makes the actual provider call)
//! ```
//!
//! ## Storage vs Application Order
//!
//! The `layers` vector stores middleware in **outermost-first** order for intuitive
//! builder semantics (last added = outermost), but they are **applied in reverse**
//! during `build()` to construct the proper nesting.

use std::sync::Arc;
use std::time::Duration;

use ingest_core::connector::IngestConnector;
use ingest_core::middleware::{Middleware, MiddlewareDescriptor, ValidationContext};
use ingest_core::{IngestError, RateLimitTracker};
use ingest_types::RateLimitConfig;

/// Generic middleware builder for composing a connector with layered wrappers.
///
/// See [module-level documentation](self) for details on middleware ordering.
pub struct ConnectorBuilder {
    raw: Arc<dyn IngestConnector>,
    /// Middleware layers in outermost-first order.
    layers: Vec<MiddlewareDescriptor>,
}

impl ConnectorBuilder {
    /// Create a new builder from a raw, unwrapped connector.
    #[must_use]
    pub fn new(raw: Arc<dyn IngestConnector>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    /// Reorder layers to satisfy helper ordering policy:
    /// Blacklist (outermost) -> RateLimit -> others (stable among themselves).
    fn enforce_ordering(&mut self) {
        self.layers.sort_by_key(|d| match d.name() {
            "BlacklistConnector" => 0,
            "RateLimitedConnector" => 1,
            _ => 2,
        });
    }

    /// Add or replace blacklist configuration.
    ///
    /// Adds blacklist middleware at the outermost position so it checks
    /// blacklist state before any other middleware runs.
    #[must_use]
    pub fn with_blacklist(mut self, duration: Duration) -> Self {
        self.layers.retain(|d| d.name() != "BlacklistConnector");
        self.layers.push(MiddlewareDescriptor::new(
            crate::blacklist::BlacklistMiddleware::new(duration),
        ));
        self.enforce_ordering();
        self
    }

    /// Remove blacklist if present.
    #[must_use]
    pub fn without_blacklist(mut self) -> Self {
        self.layers.retain(|d| d.name() != "BlacklistConnector");
        self
    }

    /// Add or replace rate-limit configuration, sharing `tracker` with the
    /// caller so its status can be queried independently of the connector.
    #[must_use]
    pub fn with_rate_limit(mut self, cfg: RateLimitConfig, tracker: Arc<RateLimitTracker>) -> Self {
        self.layers.retain(|d| d.name() != "RateLimitedConnector");
        self.layers.push(MiddlewareDescriptor::new(
            crate::rate_limit::RateLimitMiddleware::new(cfg, tracker),
        ));
        self.enforce_ordering();
        self
    }

    /// Remove rate-limit middleware if present.
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.layers.retain(|d| d.name() != "RateLimitedConnector");
        self
    }

    /// Validate the middleware stack without building.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidMiddlewareStack`] if validation fails.
    pub fn validate(&self) -> Result<(), IngestError> {
        for (idx, desc) in self.layers.iter().enumerate().rev() {
            let ctx = ValidationContext::new(&self.layers, idx);
            desc.middleware().validate(&ctx)?;
        }
        Ok(())
    }

    /// Build the wrapped connector according to the captured stack.
    ///
    /// Validates first, then applies middleware layers in reverse order
    /// (innermost to outermost): with `layers = [Blacklist, RateLimit]`, the
    /// result is `Blacklist(RateLimit(Raw))`.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidMiddlewareStack`] if validation fails.
    pub fn build(self) -> Result<Arc<dyn IngestConnector>, IngestError> {
        self.validate()?;
        let mut acc: Arc<dyn IngestConnector> = Arc::clone(&self.raw);
        for desc in self.layers.into_iter().rev() {
            acc = desc.into_middleware().apply(acc);
        }
        Ok(acc)
    }

    /// Add an arbitrary middleware layer at the outermost position.
    #[must_use]
    pub fn layer<M: Middleware + 'static>(mut self, layer: M) -> Self {
        self.layers.insert(0, MiddlewareDescriptor::new(layer));
        self
    }
}

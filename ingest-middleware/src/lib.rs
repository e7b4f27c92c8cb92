//! ingest-middleware
//!
//! Connector middleware: blacklisting and rate-limiting wrappers composed
//! through [`builder::ConnectorBuilder`] into an onion stack around a raw
//! [`ingest_core::IngestConnector`].

mod blacklist;
mod builder;
mod rate_limit;

pub use crate::blacklist::{BlacklistConnector, BlacklistMiddleware};
pub use crate::builder::ConnectorBuilder;
pub use crate::rate_limit::{RateLimitMiddleware, RateLimitedConnector};

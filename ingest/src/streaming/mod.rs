//! Streaming client base (C8) and failover router (C9).
//!
//! - `state`: the pure [`state::ConnectionState`] transition table.
//! - `session`: [`session::StreamingSession`], one gated reconnect loop per provider.
//! - `router`: [`router::FailoverRouter`], switching the active provider on sustained failure.

/// Provider session lifecycle driver.
pub mod session;
/// Pure connection-state transition table.
pub mod state;

/// Multi-provider failover routing for live subscriptions.
pub mod router;

pub use router::FailoverRouter;
pub use session::StreamingSession;
pub use state::{ConnectionState, Event};

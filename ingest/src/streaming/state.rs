//! Per-provider streaming connection state machine (C8), `spec.md` §4.7's
//! transition table implemented literally as a pure, synchronous state
//! machine so it can be unit-tested against the table directly; the driving
//! session logic lives in [`super::session`].

/// A streaming provider session's externally-observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport open; init state, and the state reached after `disconnect()`.
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Transport is open; credentials have been sent, awaiting acknowledgement.
    Authenticating,
    /// Authenticated; no active subscriptions yet.
    Ready,
    /// Authenticated with at least one active subscription.
    Streaming,
    /// Transport was lost; a gated reconnect loop is running.
    Reconnecting,
}

/// Events the session reports to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `connect()` was called from `Disconnected`.
    Connect,
    /// The transport finished opening.
    TransportOpened,
    /// The transport failed to open.
    TransportFailed,
    /// The server acknowledged credentials.
    AuthAcked,
    /// The server rejected credentials (fatal for this process lifetime).
    AuthRejected,
    /// The first subscription was added while `Ready`.
    FirstSubscribe,
    /// The last active subscription was removed.
    UnsubscribeAll,
    /// The transport was lost while `Ready` or `Streaming`.
    TransportLost,
    /// A reconnect attempt succeeded.
    ReconnectSucceeded,
    /// The reconnect helper's `maxAttempts` was exhausted.
    MaxAttemptsReached,
}

impl ConnectionState {
    /// Apply `event`, returning the resulting state, or `None` if `event` is
    /// not a valid transition from `self` per `spec.md` §4.7's table.
    #[must_use]
    pub const fn apply(self, event: Event) -> Option<Self> {
        use ConnectionState::{Authenticating, Connecting, Disconnected, Reconnecting, Ready, Streaming};
        use Event::{
            AuthAcked, AuthRejected, Connect, FirstSubscribe, MaxAttemptsReached, ReconnectSucceeded,
            TransportFailed, TransportLost, TransportOpened, UnsubscribeAll,
        };
        match (self, event) {
            (Disconnected, Connect) => Some(Connecting),
            (Connecting, TransportOpened) => Some(Authenticating),
            (Connecting, TransportFailed) => Some(Disconnected),
            (Authenticating, AuthAcked) => Some(Ready),
            (Authenticating, AuthRejected) => Some(Disconnected),
            (Ready, FirstSubscribe) => Some(Streaming),
            (Ready, TransportLost) => Some(Reconnecting),
            (Streaming, UnsubscribeAll) => Some(Ready),
            (Streaming, TransportLost) => Some(Reconnecting),
            (Reconnecting, ReconnectSucceeded) => Some(Ready),
            (Reconnecting, MaxAttemptsReached) => Some(Disconnected),
            _ => None,
        }
    }

    /// True while at least one subscription is expected to be active.
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::{Authenticating, Connecting, Disconnected, Reconnecting, Ready, Streaming};

    #[test]
    fn table_allows_every_documented_transition() {
        assert_eq!(Disconnected.apply(Event::Connect), Some(Connecting));
        assert_eq!(Connecting.apply(Event::TransportOpened), Some(Authenticating));
        assert_eq!(Connecting.apply(Event::TransportFailed), Some(Disconnected));
        assert_eq!(Authenticating.apply(Event::AuthAcked), Some(Ready));
        assert_eq!(Authenticating.apply(Event::AuthRejected), Some(Disconnected));
        assert_eq!(Ready.apply(Event::FirstSubscribe), Some(Streaming));
        assert_eq!(Ready.apply(Event::TransportLost), Some(Reconnecting));
        assert_eq!(Streaming.apply(Event::UnsubscribeAll), Some(Ready));
        assert_eq!(Streaming.apply(Event::TransportLost), Some(Reconnecting));
        assert_eq!(Reconnecting.apply(Event::ReconnectSucceeded), Some(Ready));
        assert_eq!(Reconnecting.apply(Event::MaxAttemptsReached), Some(Disconnected));
    }

    #[test]
    fn undocumented_transitions_are_rejected() {
        assert_eq!(Disconnected.apply(Event::FirstSubscribe), None);
        assert_eq!(Ready.apply(Event::Connect), None);
        assert_eq!(Streaming.apply(Event::AuthAcked), None);
    }
}

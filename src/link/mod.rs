// Connection lifecycle shared by the broker link and viewer links.
//
// Only the types live here. Every connection owns its own state instance;
// nothing in the crate keeps a second copy of another link's state.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle of a single outbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt in flight
    Disconnected,
    /// Attempt in flight
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection lost unexpectedly, waiting to retry
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// State after starting a connection attempt.
    pub fn on_attempt(self) -> Self {
        ConnectionState::Connecting
    }

    /// State after the remote end accepted the connection.
    pub fn on_established(self) -> Self {
        ConnectionState::Connected
    }

    /// State after the transport failed or closed without us asking.
    ///
    /// A lost live connection goes to `Reconnecting`; a failed attempt that
    /// never got connected stays in the retry cycle as well.
    pub fn on_lost(self) -> Self {
        match self {
            ConnectionState::Disconnected => ConnectionState::Disconnected,
            _ => ConnectionState::Reconnecting,
        }
    }

    /// State after a requested teardown.
    pub fn on_closed(self) -> Self {
        ConnectionState::Disconnected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Reconnect delay policy.
///
/// With `max == initial` the delay is fixed. Otherwise each failed attempt
/// doubles the delay up to `max`, and a successful connection resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    /// Delay to wait before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(16));
        self.attempt = self.attempt.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_lifecycle_transitions() {
        let state = ConnectionState::default();
        assert_eq!(state, ConnectionState::Disconnected);

        let state = state.on_attempt();
        assert_eq!(state, ConnectionState::Connecting);

        let state = state.on_established();
        assert!(state.is_connected());

        // Unexpected loss goes through Reconnecting back to Connecting
        let state = state.on_lost();
        assert_eq!(state, ConnectionState::Reconnecting);
        assert_eq!(state.on_attempt(), ConnectionState::Connecting);
    }

    #[test]
    fn closed_is_terminal_until_next_attempt() {
        let state = ConnectionState::Connected.on_closed();
        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(state.on_lost(), ConnectionState::Disconnected);
    }

    #[test]
    fn fixed_backoff_never_grows() {
        let mut backoff = Backoff::fixed(Duration::from_secs(3));
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        }
    }

    #[test]
    fn capped_backoff_doubles_then_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn max_below_initial_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}

//! Lifecycle events broadcast to every listener.

use std::fmt;
use std::time::Duration;

use lobby_transport::CloseCode;

/// Why the connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller asked for it with `disconnect()`.
    Requested,
    /// The socket dropped; a reconnect is scheduled.
    Unexpected,
    /// A ban or unban notice preceded the close. The lobby reconnects once
    /// a fresh access token is supplied.
    Banned,
    /// The server closed with a policy code (4000–4999). Terminal.
    ServerPolicy,
    /// Reconnection gave up after the timeout budget. Terminal.
    RetryExhausted,
}

impl DisconnectReason {
    /// Returns `true` if the lobby will not reconnect on its own.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Requested | Self::ServerPolicy | Self::RetryExhausted
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Unexpected => write!(f, "unexpected"),
            Self::Banned => write!(f, "banned"),
            Self::ServerPolicy => write!(f, "server policy"),
            Self::RetryExhausted => write!(f, "retry exhausted"),
        }
    }
}

/// A connection lifecycle event.
///
/// By the time `Disconnected` is delivered, every pending request has
/// already failed with `ConnectionLost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    /// The socket opened. `session_id` is the session being resumed, if
    /// any; the new one arrives with the `connectNotif` that follows.
    Connected { session_id: Option<String> },
    /// A reconnect attempt is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The connection ended.
    Disconnected {
        code: CloseCode,
        reason: DisconnectReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(DisconnectReason::Requested.is_terminal());
        assert!(DisconnectReason::RetryExhausted.is_terminal());
        assert!(DisconnectReason::ServerPolicy.is_terminal());
        assert!(!DisconnectReason::Unexpected.is_terminal());
        assert!(!DisconnectReason::Banned.is_terminal());
    }
}

//! The connection lifecycle state machine.
//!
//! The lobby has exactly one connection, and it is always in one of four
//! states:
//!
//! ```text
//!                 connect            transport open
//!  Disconnected ───────────▶ Connecting ───────────▶ Connected
//!       ▲  ▲                     │                      │  │
//!       │  └─────────────────────┘ transport failed     │  │ disconnect
//!       │        or disconnect                          │  ▼
//!       │◀──────────────────────────────────────────────┘ Disconnecting
//!       │               transport closed                     │
//!       └────────────────────────────────────────────────────┘
//!                          transport closed
//! ```
//!
//! This module only answers "what is the next state?". Side effects
//! (sweeping pending calls, firing events, scheduling a reconnect) belong
//! to the driver that owns the socket.

use std::fmt;

use crate::SessionError;

/// Where the lobby connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket. Initial and terminal state.
    #[default]
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// The socket is open; requests may be sent.
    Connected,
    /// A caller asked to disconnect; waiting for the close to complete.
    Disconnecting,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A caller (or the reconnect timer) asked to connect.
    Connect,
    /// The transport reported the socket open.
    TransportOpen,
    /// The transport could not open the socket.
    TransportFailed,
    /// The socket closed, for whatever reason.
    TransportClosed,
    /// A caller asked to disconnect.
    Disconnect,
}

impl ConnectionState {
    /// Returns `true` only while requests can be sent.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Applies `event` and returns the next state.
    ///
    /// `Connect` while already connecting/connected and `Disconnect` while
    /// already disconnected(-ing) are accepted as no-ops.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] for an event the current
    /// state has no edge for.
    pub fn on(self, event: ConnectionEvent) -> Result<Self, SessionError> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let next = match (self, event) {
            (S::Disconnected, E::Connect) => S::Connecting,
            (S::Connecting | S::Connected, E::Connect) => self,

            (S::Connecting, E::TransportOpen) => S::Connected,
            (S::Connecting, E::TransportFailed) => S::Disconnected,
            (S::Connecting, E::Disconnect) => S::Disconnected,

            (S::Connected, E::TransportClosed) => S::Disconnected,
            (S::Connected, E::Disconnect) => S::Disconnecting,

            (S::Disconnecting, E::TransportClosed) => S::Disconnected,
            (S::Disconnecting | S::Disconnected, E::Disconnect) => self,

            (from, event) => {
                return Err(SessionError::InvalidTransition { from, event });
            }
        };
        Ok(next)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionEvent as E;
    use ConnectionState as S;

    #[test]
    fn test_on_happy_path_connect_then_disconnect() {
        let s = S::default();
        assert_eq!(s, S::Disconnected);
        let s = s.on(E::Connect).unwrap();
        assert_eq!(s, S::Connecting);
        let s = s.on(E::TransportOpen).unwrap();
        assert_eq!(s, S::Connected);
        let s = s.on(E::Disconnect).unwrap();
        assert_eq!(s, S::Disconnecting);
        let s = s.on(E::TransportClosed).unwrap();
        assert_eq!(s, S::Disconnected);
    }

    #[test]
    fn test_on_unexpected_close_goes_straight_to_disconnected() {
        assert_eq!(S::Connected.on(E::TransportClosed).unwrap(), S::Disconnected);
    }

    #[test]
    fn test_on_failed_open_returns_to_disconnected() {
        assert_eq!(
            S::Connecting.on(E::TransportFailed).unwrap(),
            S::Disconnected
        );
    }

    #[test]
    fn test_on_disconnect_is_idempotent() {
        assert_eq!(S::Disconnected.on(E::Disconnect).unwrap(), S::Disconnected);
        assert_eq!(
            S::Disconnecting.on(E::Disconnect).unwrap(),
            S::Disconnecting
        );
    }

    #[test]
    fn test_on_connect_while_connected_is_noop() {
        assert_eq!(S::Connected.on(E::Connect).unwrap(), S::Connected);
        assert_eq!(S::Connecting.on(E::Connect).unwrap(), S::Connecting);
    }

    #[test]
    fn test_on_invalid_edges_are_rejected() {
        assert!(matches!(
            S::Disconnected.on(E::TransportOpen),
            Err(SessionError::InvalidTransition {
                from: S::Disconnected,
                event: E::TransportOpen
            })
        ));
        assert!(S::Disconnecting.on(E::Connect).is_err());
        assert!(S::Connected.on(E::TransportOpen).is_err());
    }

    #[test]
    fn test_is_connected_only_when_connected() {
        assert!(S::Connected.is_connected());
        assert!(!S::Connecting.is_connected());
        assert!(!S::Disconnecting.is_connected());
        assert!(!S::Disconnected.is_connected());
    }

    #[test]
    fn test_display() {
        assert_eq!(S::Disconnecting.to_string(), "Disconnecting");
    }
}

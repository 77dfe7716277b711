//! Error types for the session layer.

use crate::{ConnectionEvent, ConnectionState};

/// Errors that can occur while managing the lobby session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No access token is available, so there is nothing to authenticate
    /// the socket with. The login flow hasn't run yet (or the token was
    /// cleared).
    #[error("no access token available")]
    MissingToken,

    /// The connection state machine has no edge for this event in its
    /// current state. This indicates a driver bug, not a network problem.
    #[error("invalid transition: {event:?} while {from}")]
    InvalidTransition {
        from: ConnectionState,
        event: ConnectionEvent,
    },
}

//! Unified error type for the lobby client.

use lobby_protocol::{MessageId, MessageType, ProtocolError};
use lobby_session::SessionError;
use lobby_transport::{CloseCode, TransportError};

/// Everything a lobby call can fail with.
///
/// The lower crates' errors convert with `?` through the `#[from]`
/// variants.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// There is no live connection. Requests fail fast instead of queuing.
    #[error("not connected to the lobby")]
    NotConnected,

    /// The connection closed while the request was waiting for its answer.
    #[error("connection lost (close code {code})")]
    ConnectionLost { code: CloseCode },

    /// A frame (or the payload of a response) couldn't be decoded.
    #[error("decode failed: {0}")]
    Decode(#[from] ProtocolError),

    /// A response arrived for an id nobody is waiting on. Only ever logged.
    #[error("no pending call for message {0}")]
    OrphanResponse(MessageId),

    /// A party-storage update lost the race against another writer.
    #[error("party storage was modified concurrently")]
    VersionConflict,

    /// Gave up after the attempt budget ran out (party-storage writes) or
    /// after the reconnect timeout elapsed.
    #[error("gave up after {attempts} attempts, try again later")]
    RetryExhausted { attempts: u32 },

    /// The server answered with a non-zero error code.
    #[error("server error {code}: {message}")]
    ServerError { code: i64, message: String },

    /// A request was registered under an id that is still pending.
    #[error("message id {0} is already pending")]
    DuplicateId(MessageId),

    /// No response arrived within the request timeout.
    #[error("request {0} timed out")]
    Timeout(MessageId),

    /// The response for an id had a different type than the request
    /// expects.
    #[error("expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: MessageType,
        actual: MessageType,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The driver task has stopped; the `Lobby` handle is unusable.
    #[error("lobby driver has shut down")]
    Shutdown,
}

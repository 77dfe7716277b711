//! Session state for the lobby client.
//!
//! This crate holds the parts of a lobby connection that don't touch a
//! socket:
//!
//! 1. **Credentials**: the access token shared with whatever logs the user
//!    in ([`Credentials`], with its token-update hook)
//! 2. **Lifecycle**: the connection state machine ([`ConnectionState`])
//! 3. **Reconnection**: backoff with jitter and the ban gate
//!    ([`ReconnectController`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby client (above)  ← drives the socket, asks this crate what to do
//!     ↕
//! Session layer (this crate)  ← token, lifecycle, retry policy
//!     ↕
//! Transport (below)  ← opens sockets with the headers built from the token
//! ```

mod credentials;
mod error;
mod reconnect;
mod session;

pub use credentials::{AccessToken, Credentials, TokenWatch};
pub use error::SessionError;
pub use reconnect::{
    Backoff, ReconnectConfig, ReconnectController, ReconnectDecision, StopReason,
};
pub use session::{ConnectionEvent, ConnectionState};

//! # Lobby
//!
//! A client for a real-time lobby service. One persistent WebSocket
//! carries many independent request/response exchanges plus server-pushed
//! notifications, and the client reconnects on its own when the network
//! drops.
//!
//! - [`Lobby`] is the handle callers hold: connect, send requests, subscribe
//!   to notifications.
//! - [`LobbyDriver`] is the task behind it. It owns the socket, matches
//!   responses to requests ([`PendingCalls`]), routes notifications
//!   ([`NotificationRouter`]) and runs the reconnect policy.
//! - [`PartyStorageWriter`] does optimistic read-modify-write on a party's
//!   shared storage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobby::prelude::*;
//!
//! # async fn run() -> Result<(), LobbyError> {
//! let lobby = Lobby::builder()
//!     .url("wss://lobby.example.com/lobby/")
//!     .access_token("eyJhbGciOi...")
//!     .spawn_websocket();
//!
//! let mut events = lobby.events();
//! lobby.connect().await?;
//! while let Ok(event) = events.recv().await {
//!     if matches!(event, LobbyEvent::Connected { .. }) {
//!         break;
//!     }
//! }
//!
//! lobby.on_party_chat(|message| println!("{}: {}", message.from, message.payload));
//! let party = lobby.create_party().await?;
//! println!("created party {}", party.party_id);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod driver;
mod error;
mod event;
mod party_storage;
mod pending;
mod requests;
mod router;

pub use client::{Lobby, PendingResponse, Subscription};
pub use config::{LobbyBuilder, LobbyConfig};
pub use driver::LobbyDriver;
pub use error::LobbyError;
pub use event::{DisconnectReason, LobbyEvent};
pub use party_storage::{
    PartyDataDocument, PartyDataUpdate, PartyStorageBackend, PartyStorageWriter,
};
pub use pending::PendingCalls;
pub use requests::{BanNotice, ChatMessage, PartyInfo, PartyInvitation, UserStatus};
pub use router::{Handler, NotificationRouter, SubscriptionId};

pub use lobby_protocol as protocol;
pub use lobby_session as session;
pub use lobby_transport as transport;

/// Common imports for lobby users.
pub mod prelude {
    pub use crate::{
        DisconnectReason, Lobby, LobbyBuilder, LobbyConfig, LobbyError,
        LobbyEvent, PartyDataDocument, PartyStorageBackend, PartyStorageWriter,
        Subscription,
    };
    pub use lobby_protocol::{Fields, Frame, MessageId, MessageType};
    pub use lobby_session::{AccessToken, ConnectionState, Credentials, ReconnectConfig};
    pub use lobby_transport::{CloseCode, Transport};
}

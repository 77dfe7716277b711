//! Wire protocol for the lobby client.
//!
//! This crate defines the "language" the client and the lobby service
//! speak:
//!
//! - **Message types** ([`MessageType`]): the catalogue of request,
//!   response and notification names.
//! - **Frames** ([`Frame`], [`Header`], [`Fields`]): one message, made of a
//!   header used for routing plus an ordered key/value payload.
//! - **Codec** ([`Codec`] trait, [`TextCodec`]): how frames become the
//!   text that travels in a WebSocket message, and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw text) and the lobby
//! client (pending calls, notification routing). It doesn't know about
//! connections; it only knows how to read and write frames.
//!
//! ```text
//! Transport (text) → Protocol (Frame) → Lobby (routing, correlation)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod frame;
mod message_type;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, TextCodec};
pub use error::ProtocolError;
pub use frame::{FieldValue, Fields, Frame, Header, IdGenerator, MessageId};
pub use message_type::MessageType;

//! Transport abstraction layer for the lobby client.
//!
//! The lobby never talks to a concrete socket. It asks a [`Transport`] to
//! open a connection and gets back a [`Socket`]: a pair of channels that
//! carry outbound commands (send text, close) and inbound events (a text
//! message arrived, the connection closed).
//!
//! The network I/O itself runs wherever the transport puts it (for the
//! WebSocket transport, a dedicated Tokio task). The lobby only ever sees
//! the events, in order, on its own task.
//!
//! ```text
//! Lobby driver ──Outbound──▶ SocketPeer (transport pump) ──▶ network
//!      ▲                                                    │
//!      └──────────────SocketEvent◀──────────────────────────┘
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client transport via `tokio-tungstenite`
//! - `tls`: `wss://` support through rustls

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// CloseCode
// ---------------------------------------------------------------------------

/// A WebSocket close status code.
///
/// Newtype over the raw `u16` so close codes can't be confused with
/// protocol error codes, which are also small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Orderly shutdown requested by either side.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// The peer is going away (server restart, page navigation).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// The close frame carried no status code.
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// The connection dropped without a close frame.
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Returns `true` for codes in the application range `4000..=4999`,
    /// which the lobby server uses for deliberate terminations (kicked,
    /// duplicate login, token revoked).
    pub fn is_server_policy(self) -> bool {
        (4000..=4999).contains(&self.0)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Socket events and commands
// ---------------------------------------------------------------------------

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A complete text message arrived.
    Message(String),
    /// The connection is closed. Always the last event a socket yields.
    Closed(CloseCode),
}

/// A command for the transport to carry out on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text message.
    Text(String),
    /// Start a close handshake with the given status code.
    Close(CloseCode),
}

/// What the lobby asks the transport to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// The `ws://` or `wss://` URL of the lobby service.
    pub url: String,
    /// Extra HTTP headers for the upgrade request (authorization, session
    /// resume).
    pub headers: Vec<(String, String)>,
}

impl OpenRequest {
    /// Creates a request with no extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header to the upgrade request.
    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// ---------------------------------------------------------------------------
// Socket / SocketPeer
// ---------------------------------------------------------------------------

/// The lobby's end of an open connection.
///
/// Dropping a `Socket` closes the outbound channel, which tells the
/// transport to tear the connection down.
#[derive(Debug)]
pub struct Socket {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// The transport's end of an open connection.
///
/// Transport implementations (and tests) pump [`Outbound`] commands from
/// here onto the wire and push [`SocketEvent`]s back.
#[derive(Debug)]
pub struct SocketPeer {
    outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
}

impl Socket {
    /// Creates a connected `Socket` / `SocketPeer` pair.
    pub fn pair() -> (Socket, SocketPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Socket {
                outbound: out_tx,
                inbound: in_rx,
            },
            SocketPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Queues a text message for sending.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Asks the transport to close the connection. The matching
    /// [`SocketEvent::Closed`] arrives once the close completes.
    pub fn close(&self, code: CloseCode) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Close(code))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Waits for the next event.
    ///
    /// If the transport vanished without reporting a close, this yields a
    /// synthetic `Closed(ABNORMAL)`.
    pub async fn recv(&mut self) -> SocketEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(SocketEvent::Closed(CloseCode::ABNORMAL))
    }
}

impl SocketPeer {
    /// Waits for the next command from the lobby. `None` means the
    /// [`Socket`] was dropped.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Returns the next queued command without waiting.
    pub fn try_next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Delivers a text message to the lobby. Returns `false` if the
    /// lobby side is gone.
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        self.inbound.send(SocketEvent::Message(text.into())).is_ok()
    }

    /// Reports the connection as closed.
    pub fn closed(&self, code: CloseCode) -> bool {
        self.inbound.send(SocketEvent::Closed(code)).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Opens connections to the lobby service.
///
/// The returned future must be `Send`: the lobby runs each open attempt in
/// its own task so a slow handshake never stalls request dispatch.
pub trait Transport: Send + Sync + 'static {
    /// Opens a connection. Resolving to `Ok` is the "open" event.
    fn open(
        &self,
        request: OpenRequest,
    ) -> impl Future<Output = Result<Socket, TransportError>> + Send;
}

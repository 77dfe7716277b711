//! Lobby configuration and builder.

use std::time::Duration;

use lobby_protocol::{Codec, TextCodec};
use lobby_session::{AccessToken, Credentials, ReconnectConfig};
use lobby_transport::{Transport, WebSocketConfig, WebSocketTransport};

use crate::driver::LobbyDriver;
use crate::Lobby;

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Settings for a [`Lobby`].
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// WebSocket URL of the lobby service, e.g. `wss://example.com/lobby/`.
    pub url: String,

    /// Automatic reconnection policy.
    pub reconnect: ReconnectConfig,

    /// How long [`Lobby::request`] waits for a response. Default: 10 s.
    pub request_timeout: Duration,

    /// How long one connection attempt may take, and how long a requested
    /// close waits for the server to confirm it. Default: 10 s.
    pub connect_timeout: Duration,

    /// Buffer size of the lifecycle event channel. Listeners that fall
    /// further behind miss events. Default: 64.
    pub event_capacity: usize,

    /// HTTP header that carries the previous session id on reconnect.
    /// Default: `X-Lobby-Session-Id`.
    pub session_header: String,

    /// WebSocket keep-alive ping interval (`None` = no pings). Only used
    /// by [`LobbyBuilder::spawn_websocket`]. Default: 10 s.
    pub ping_interval: Option<Duration>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/lobby/".to_string(),
            reconnect: ReconnectConfig::default(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            event_capacity: 64,
            session_header: "X-Lobby-Session-Id".to_string(),
            ping_interval: Some(Duration::from_secs(10)),
        }
    }
}

impl LobbyConfig {
    /// Smallest accepted request and connect timeout.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        if self.request_timeout < Self::MIN_TIMEOUT {
            tracing::warn!(
                request_timeout = ?self.request_timeout,
                "request_timeout below minimum, clamping"
            );
            self.request_timeout = Self::MIN_TIMEOUT;
        }
        if self.connect_timeout < Self::MIN_TIMEOUT {
            tracing::warn!(
                connect_timeout = ?self.connect_timeout,
                "connect_timeout below minimum, clamping"
            );
            self.connect_timeout = Self::MIN_TIMEOUT;
        }
        if self.event_capacity == 0 {
            self.event_capacity = 1;
        }
        if let Some(interval) = self.ping_interval {
            if interval.is_zero() {
                self.ping_interval = None;
            }
        }
        self.reconnect = self.reconnect.validated();
        self
    }
}

// ---------------------------------------------------------------------------
// LobbyBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`Lobby`] and its driver.
///
/// # Example
///
/// ```rust,no_run
/// use lobby::prelude::*;
///
/// # async fn run() -> Result<(), LobbyError> {
/// let lobby = Lobby::builder()
///     .url("wss://lobby.example.com/lobby/")
///     .access_token("eyJhbGciOi...")
///     .spawn_websocket();
///
/// lobby.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct LobbyBuilder {
    config: LobbyConfig,
    credentials: Credentials,
    codec: Box<dyn Codec>,
}

impl LobbyBuilder {
    /// Creates a builder with default settings and no token.
    pub fn new() -> Self {
        Self {
            config: LobbyConfig::default(),
            credentials: Credentials::new(),
            codec: Box::new(TextCodec),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the lobby URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Sets the reconnect policy.
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn session_header(mut self, name: impl Into<String>) -> Self {
        self.config.session_header = name.into();
        self
    }

    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Shares an existing credential store with the lobby. The login flow
    /// keeps its own clone and calls `set_access_token` on it.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Stores an initial access token.
    pub fn access_token(self, token: impl Into<AccessToken>) -> Self {
        self.credentials.set_access_token(token);
        self
    }

    /// Uses a different wire codec.
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Builds the handle and the driver without spawning anything.
    ///
    /// The driver does nothing until [`LobbyDriver::run`] is awaited.
    pub fn build<T: Transport>(self, transport: T) -> (Lobby, LobbyDriver<T>) {
        let config = self.config.validated();
        crate::client::wire(config, self.credentials, self.codec, transport)
    }

    /// Builds the lobby and spawns its driver on the current Tokio runtime.
    pub fn spawn<T: Transport>(self, transport: T) -> Lobby {
        let (lobby, driver) = self.build(transport);
        tokio::spawn(driver.run());
        lobby
    }

    /// Like [`spawn`](Self::spawn), over a [`WebSocketTransport`] using
    /// the configured ping interval.
    pub fn spawn_websocket(self) -> Lobby {
        let transport = WebSocketTransport::with_config(WebSocketConfig {
            ping_interval: self.config.ping_interval,
        });
        self.spawn(transport)
    }
}

impl Default for LobbyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! The `Lobby` handle: what callers hold.
//!
//! Every method is a message to the driver task. The handle itself holds
//! no protocol state, so it's cheap to clone and share between tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use lobby_protocol::{Codec, Fields, Frame, IdGenerator, MessageId, MessageType};
use lobby_session::{AccessToken, ConnectionState, Credentials, SessionError};
use lobby_transport::Transport;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::driver::LobbyDriver;
use crate::pending::Reply;
use crate::router::{Handler, SubscriptionId};
use crate::{LobbyBuilder, LobbyConfig, LobbyError, LobbyEvent};

/// Commands sent from a [`Lobby`] handle to its driver.
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        frame: Frame,
        expected: MessageType,
        reply: Reply,
    },
    /// Stop waiting for `id`; a late response becomes an orphan.
    Forget(MessageId),
    Subscribe {
        kind: MessageType,
        id: SubscriptionId,
        handler: Handler,
    },
    Unsubscribe {
        kind: MessageType,
        id: SubscriptionId,
    },
}

/// Creates a connected handle/driver pair.
pub(crate) fn wire<T: Transport>(
    config: LobbyConfig,
    credentials: Credentials,
    codec: Box<dyn Codec>,
    transport: T,
) -> (Lobby, LobbyDriver<T>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (session_tx, session_rx) = watch::channel(None);
    let (events_tx, _) = broadcast::channel(config.event_capacity);
    let ids = Arc::new(IdGenerator::new());

    let lobby = Lobby {
        commands: commands_tx,
        state: state_rx,
        session_id: session_rx,
        events: events_tx.clone(),
        credentials: credentials.clone(),
        ids: Arc::clone(&ids),
        next_subscription: Arc::new(AtomicU64::new(1)),
        request_timeout: config.request_timeout,
    };
    let driver = LobbyDriver::new(
        config,
        transport,
        codec,
        credentials,
        ids,
        commands_rx,
        state_tx,
        session_tx,
        events_tx,
    );
    (lobby, driver)
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// Handle to a lobby connection.
///
/// Clones share the same connection. When the last clone is dropped the
/// driver closes the socket and stops.
#[derive(Clone)]
pub struct Lobby {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    session_id: watch::Receiver<Option<String>>,
    events: broadcast::Sender<LobbyEvent>,
    credentials: Credentials,
    ids: Arc<IdGenerator>,
    next_subscription: Arc<AtomicU64>,
    request_timeout: Duration,
}

impl Lobby {
    /// Starts building a lobby.
    pub fn builder() -> LobbyBuilder {
        LobbyBuilder::new()
    }

    // -- Lifecycle --

    /// Starts connecting. Returns once the attempt is under way; watch
    /// [`events`](Self::events) or [`state_changes`](Self::state_changes)
    /// for the outcome. Connecting while already connected is a no-op.
    ///
    /// # Errors
    /// - [`SessionError::MissingToken`] if no access token is stored.
    /// - [`LobbyError::Shutdown`] if the driver is gone.
    pub async fn connect(&self) -> Result<(), LobbyError> {
        if self.credentials.access_token().is_none() {
            return Err(SessionError::MissingToken.into());
        }
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| LobbyError::Shutdown)?
    }

    /// Disconnects and turns off automatic reconnection.
    ///
    /// When this returns, pending requests have failed, token updates no
    /// longer trigger anything, and no further messages are delivered. The
    /// socket close itself may still be in flight. Calling it while
    /// disconnected is a no-op.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Returns `true` while requests can be sent.
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that tracks the lifecycle state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// The session id from the server's last `connectNotif`.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.borrow().clone()
    }

    /// Subscribes to lifecycle events from now on.
    pub fn events(&self) -> broadcast::Receiver<LobbyEvent> {
        self.events.subscribe()
    }

    /// The credential store this lobby authenticates with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The token-update hook: stores `token`. While connected this sends a
    /// `refreshTokenRequest`; after a ban it triggers the reconnect.
    pub fn set_access_token(&self, token: impl Into<AccessToken>) {
        self.credentials.set_access_token(token);
    }

    // -- Requests --

    /// Sends a request and returns a future for its response.
    ///
    /// Fails fast without sending anything when not connected.
    ///
    /// # Errors
    /// - [`LobbyError::NotConnected`] if there's no live connection.
    /// - [`LobbyError::Shutdown`] if the driver is gone.
    pub fn send(
        &self,
        kind: MessageType,
        fields: Fields,
    ) -> Result<PendingResponse, LobbyError> {
        if !self.is_connected() {
            return Err(LobbyError::NotConnected);
        }
        let id = self.ids.next_id();
        let expected = kind.response_type().unwrap_or_else(|| kind.clone());
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            frame: Frame::request(kind, id, fields),
            expected,
            reply,
        })?;
        Ok(PendingResponse { id, rx })
    }

    /// Sends a request and waits (up to the request timeout) for the
    /// response.
    ///
    /// # Errors
    /// Everything [`send`](Self::send) returns, plus
    /// [`LobbyError::Timeout`], [`LobbyError::ConnectionLost`],
    /// [`LobbyError::ServerError`] and [`LobbyError::UnexpectedResponse`].
    pub async fn request(
        &self,
        kind: MessageType,
        fields: Fields,
    ) -> Result<Frame, LobbyError> {
        let pending = self.send(kind, fields)?;
        let id = pending.id();
        match tokio::time::timeout(self.request_timeout, pending).await {
            Ok(result) => result,
            Err(_) => {
                let _ = self.commands.send(Command::Forget(id));
                tracing::debug!(%id, "request timed out");
                Err(LobbyError::Timeout(id))
            }
        }
    }

    /// Like [`request`](Self::request), then deserializes the payload.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        kind: MessageType,
        fields: Fields,
    ) -> Result<T, LobbyError> {
        let frame = self.request(kind, fields).await?;
        Ok(frame.parse()?)
    }

    // -- Notifications --

    /// Calls `handler` for every notification of type `kind`, in
    /// subscription order with other handlers. Handlers run on the driver
    /// task and must not block.
    pub fn subscribe<F>(&self, kind: MessageType, handler: F) -> Subscription
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        let id =
            SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            kind: kind.clone(),
            id,
        };
        if self
            .command(Command::Subscribe {
                kind,
                id,
                handler: Box::new(handler),
            })
            .is_err()
        {
            tracing::debug!(%id, "subscribe after driver shut down");
        }
        subscription
    }

    /// Like [`subscribe`](Self::subscribe), deserializing the payload
    /// first. Notifications that don't fit `T` are logged and skipped.
    pub fn subscribe_as<T, F>(&self, kind: MessageType, mut handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: FnMut(T) + Send + 'static,
    {
        self.subscribe(kind, move |frame: &Frame| match frame.parse::<T>() {
            Ok(value) => handler(value),
            Err(e) => {
                tracing::debug!(kind = %frame.kind, error = %e, "notification payload skipped");
            }
        })
    }

    /// Removes a subscription. Removing one twice is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let _ = self.command(Command::Unsubscribe {
            kind: subscription.kind.clone(),
            id: subscription.id,
        });
    }

    fn command(&self, command: Command) -> Result<(), LobbyError> {
        self.commands.send(command).map_err(|_| LobbyError::Shutdown)
    }
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PendingResponse / Subscription
// ---------------------------------------------------------------------------

/// The eventual response to a request sent with [`Lobby::send`].
///
/// Resolves exactly once. Dropping it doesn't cancel the request; the
/// response is simply discarded when it arrives.
#[derive(Debug)]
pub struct PendingResponse {
    id: MessageId,
    rx: oneshot::Receiver<Result<Frame, LobbyError>>,
}

impl PendingResponse {
    /// The message id the request went out with.
    pub fn id(&self) -> MessageId {
        self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Frame, LobbyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(LobbyError::Shutdown)))
    }
}

/// A notification subscription, used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: MessageType,
    id: SubscriptionId,
}

impl Subscription {
    pub fn kind(&self) -> &MessageType {
        &self.kind
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

//! The driver: one task that owns the connection.
//!
//! Everything that touches protocol state happens here, one event at a
//! time: caller commands, socket events, the reconnect timer, token
//! updates and the results of connection attempts are all drained by a
//! single `tokio::select!` loop. Response continuations and notification
//! handlers therefore never run concurrently with each other or with the
//! bookkeeping that feeds them.
//!
//! ```text
//!  Lobby handles ──Command──┐
//!  Socket ──SocketEvent─────┤
//!  retry / close timers ────┼──▶ LobbyDriver ──▶ PendingCalls / NotificationRouter
//!  token watch ─────────────┤                └─▶ LobbyEvent broadcast
//!  open tasks ──Opened──────┘
//! ```

use std::future;
use std::io;
use std::sync::Arc;

use lobby_protocol::{Codec, Fields, Frame, IdGenerator, MessageType, ProtocolError};
use lobby_session::{
    AccessToken, ConnectionEvent, ConnectionState, Credentials,
    ReconnectController, ReconnectDecision, StopReason, TokenWatch,
};
use lobby_transport::{
    CloseCode, OpenRequest, Socket, SocketEvent, Transport, TransportError,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::client::Command;
use crate::pending::{PendingCalls, Reply};
use crate::router::NotificationRouter;
use crate::{DisconnectReason, LobbyConfig, LobbyError, LobbyEvent};

/// Payload key of the session id in `connectNotif`.
const SESSION_ID_KEY: &str = "lobbySessionID";

/// The result of one connection attempt, tagged with the attempt it
/// belongs to so stale results can be discarded.
struct Opened {
    epoch: u64,
    result: Result<Socket, TransportError>,
}

/// Owns the connection. Obtain one from [`LobbyBuilder::build`] and run it
/// with [`run`](Self::run) (or let [`LobbyBuilder::spawn`] do it).
///
/// [`LobbyBuilder::build`]: crate::LobbyBuilder::build
/// [`LobbyBuilder::spawn`]: crate::LobbyBuilder::spawn
pub struct LobbyDriver<T: Transport> {
    config: LobbyConfig,
    transport: Arc<T>,
    codec: Box<dyn Codec>,
    credentials: Credentials,
    ids: Arc<IdGenerator>,

    commands: mpsc::UnboundedReceiver<Command>,
    opened_tx: mpsc::UnboundedSender<Opened>,
    opened_rx: mpsc::UnboundedReceiver<Opened>,
    /// `None` after an explicit disconnect: token updates are ignored.
    token_watch: Option<TokenWatch>,

    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    session_tx: watch::Sender<Option<String>>,
    events: broadcast::Sender<LobbyEvent>,

    socket: Option<Socket>,
    /// Incremented per connection attempt.
    epoch: u64,
    pending: PendingCalls,
    router: NotificationRouter,
    reconnect: ReconnectController,
    retry_at: Option<Instant>,
    /// When a requested close is given up on if the transport never
    /// confirms it.
    close_deadline: Option<Instant>,
    /// Reconnects scheduled since the last successful open.
    retries: u32,
}

impl<T: Transport> LobbyDriver<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: LobbyConfig,
        transport: T,
        codec: Box<dyn Codec>,
        credentials: Credentials,
        ids: Arc<IdGenerator>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        session_tx: watch::Sender<Option<String>>,
        events: broadcast::Sender<LobbyEvent>,
    ) -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            reconnect: ReconnectController::new(config.reconnect.clone()),
            config,
            transport: Arc::new(transport),
            codec,
            credentials,
            ids,
            commands,
            opened_tx,
            opened_rx,
            token_watch: None,
            state: ConnectionState::Disconnected,
            state_tx,
            session_tx,
            events,
            socket: None,
            epoch: 0,
            pending: PendingCalls::new(),
            router: NotificationRouter::new(),
            retry_at: None,
            close_deadline: None,
            retries: 0,
        }
    }

    /// Runs until every [`Lobby`](crate::Lobby) handle has been dropped.
    pub async fn run(mut self) {
        tracing::debug!(url = %self.config.url, "lobby driver started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = next_socket_event(&mut self.socket) => {
                    self.handle_socket_event(event);
                }
                Some(opened) = self.opened_rx.recv() => {
                    self.handle_opened(opened);
                }
                () = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.start_attempt();
                }
                () = sleep_until(self.close_deadline) => {
                    self.close_deadline = None;
                    self.handle_close_timeout();
                }
                changed = token_changed(&mut self.token_watch) => {
                    if changed {
                        self.handle_token_updated();
                    } else {
                        self.token_watch = None;
                    }
                }
            }
        }

        if let Some(socket) = self.socket.take() {
            let _ = socket.close(CloseCode::GOING_AWAY);
        }
        self.pending.sweep_all(CloseCode::GOING_AWAY);
        tracing::debug!("lobby driver stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let _ = reply.send(self.handle_connect());
            }
            Command::Disconnect { reply } => {
                self.handle_disconnect();
                let _ = reply.send(());
            }
            Command::Send {
                frame,
                expected,
                reply,
            } => self.handle_send(frame, expected, reply),
            Command::Forget(id) => {
                self.pending.forget(id);
            }
            Command::Subscribe { kind, id, handler } => {
                self.router.subscribe(kind, id, handler);
            }
            Command::Unsubscribe { kind, id } => {
                self.router.unsubscribe(&kind, id);
            }
        }
    }

    fn handle_connect(&mut self) -> Result<(), LobbyError> {
        // Validates the edge; Disconnecting rejects a new connect.
        self.state.on(ConnectionEvent::Connect)?;
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }
        if self.token_watch.is_none() {
            self.token_watch = Some(self.credentials.subscribe());
        }
        self.retry_at = None;
        self.start_attempt();
        Ok(())
    }

    fn handle_disconnect(&mut self) {
        // Stop reacting to token updates and retries before anything else.
        self.token_watch = None;
        self.retry_at = None;
        self.reconnect.cancel();
        self.retries = 0;

        match self.state {
            ConnectionState::Connected => {
                self.transition(ConnectionEvent::Disconnect);
                self.pending.sweep_all(CloseCode::NORMAL);
                let closed = self
                    .socket
                    .as_ref()
                    .map(|socket| socket.close(CloseCode::NORMAL));
                if matches!(closed, Some(Ok(()))) {
                    self.close_deadline =
                        Some(Instant::now() + self.config.connect_timeout);
                } else {
                    // The transport is already gone; finish the close here.
                    self.socket = None;
                    self.handle_closed(CloseCode::NORMAL);
                }
            }
            ConnectionState::Connecting => {
                // Invalidate the in-flight attempt; its socket is closed on
                // arrival.
                self.epoch += 1;
                self.transition(ConnectionEvent::Disconnect);
                self.emit(LobbyEvent::Disconnected {
                    code: CloseCode::NORMAL,
                    reason: DisconnectReason::Requested,
                });
            }
            ConnectionState::Disconnected | ConnectionState::Disconnecting => {}
        }
    }

    fn handle_send(&mut self, frame: Frame, expected: MessageType, reply: Reply) {
        if !self.state.is_connected() {
            let _ = reply.send(Err(LobbyError::NotConnected));
            return;
        }
        let Some(id) = frame.id else {
            let _ = reply.send(Err(LobbyError::Decode(
                ProtocolError::InvalidField("request without id".into()),
            )));
            return;
        };
        let text = match self.codec.encode(&frame) {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        if self.pending.register(id, expected, reply).is_err() {
            return;
        }

        let sent = self
            .socket
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)
            .and_then(|socket| socket.send(text));
        match sent {
            Ok(()) => tracing::debug!(%id, kind = %frame.kind, "request sent"),
            Err(e) => {
                self.pending.fail(id, e.into());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connection attempts
    // -----------------------------------------------------------------------

    /// Moves to `Connecting` and opens the transport in a separate task.
    fn start_attempt(&mut self) {
        self.transition(ConnectionEvent::Connect);
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.epoch += 1;

        let Some(token) = self.credentials.access_token() else {
            tracing::warn!("no access token for connection attempt");
            self.handle_open_failed(TransportError::InvalidRequest(
                "no access token".into(),
            ));
            return;
        };

        let request = self.open_request(&token);
        let transport = Arc::clone(&self.transport);
        let opened = self.opened_tx.clone();
        let epoch = self.epoch;
        let connect_timeout = self.config.connect_timeout;
        tracing::info!(url = %self.config.url, epoch, "connecting to lobby");

        tokio::spawn(async move {
            let result =
                match tokio::time::timeout(connect_timeout, transport.open(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::ConnectFailed(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connection attempt timed out",
                    ))),
                };
            let _ = opened.send(Opened { epoch, result });
        });
    }

    fn open_request(&self, token: &AccessToken) -> OpenRequest {
        let mut request = OpenRequest::new(self.config.url.clone())
            .header("Authorization", format!("Bearer {}", token.as_str()));
        if let Some(session_id) = self.session_tx.borrow().as_ref() {
            request =
                request.header(self.config.session_header.clone(), session_id.clone());
        }
        request
    }

    fn handle_opened(&mut self, opened: Opened) {
        if opened.epoch != self.epoch
            || self.state != ConnectionState::Connecting
        {
            if let Ok(socket) = opened.result {
                tracing::debug!(epoch = opened.epoch, "closing stale socket");
                let _ = socket.close(CloseCode::NORMAL);
            }
            return;
        }

        match opened.result {
            Ok(socket) => {
                self.socket = Some(socket);
                self.transition(ConnectionEvent::TransportOpen);
                self.reconnect.on_connected();
                self.retries = 0;
                if self.token_watch.is_none() {
                    self.token_watch = Some(self.credentials.subscribe());
                }
                let session_id = self.session_tx.borrow().clone();
                tracing::info!(session_id = ?session_id, "connected to lobby");
                self.emit(LobbyEvent::Connected { session_id });
            }
            Err(e) => self.handle_open_failed(e),
        }
    }

    fn handle_open_failed(&mut self, error: TransportError) {
        tracing::warn!(error = %error, "connection attempt failed");
        self.transition(ConnectionEvent::TransportFailed);
        let decision = self.reconnect.on_connect_failed(now());
        self.apply_decision(decision, CloseCode::ABNORMAL, false);
    }

    // -----------------------------------------------------------------------
    // Socket events
    // -----------------------------------------------------------------------

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Message(text) => {
                if self.state == ConnectionState::Disconnecting {
                    tracing::debug!("dropping message received while disconnecting");
                    return;
                }
                self.handle_text(&text);
            }
            SocketEvent::Closed(code) => {
                self.socket = None;
                self.handle_closed(code);
            }
        }
    }

    /// Decodes and routes one inbound message.
    ///
    /// Header first: a frame whose header can't be read is dropped. If
    /// only the payload is bad, the call waiting on the frame's id (if
    /// any) fails with the decode error instead of waiting for a timeout.
    fn handle_text(&mut self, text: &str) {
        let header = match self.codec.decode_header(text) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(error = %e, "dropping frame with bad header");
                return;
            }
        };
        let fields = match self.codec.decode_payload(text) {
            Ok(fields) => fields,
            Err(e) => {
                match header.id.filter(|id| self.pending.contains(*id)) {
                    Some(id) => {
                        tracing::debug!(%id, error = %e, "response payload undecodable");
                        self.pending.fail(id, e.into());
                    }
                    None => {
                        tracing::debug!(kind = %header.kind, error = %e, "dropping undecodable frame");
                    }
                }
                return;
            }
        };
        self.route(Frame::from_parts(header, fields));
    }

    fn route(&mut self, frame: Frame) {
        match frame.kind {
            MessageType::ConnectNotif => {
                if let Some(session_id) = frame.fields.get_text(SESSION_ID_KEY) {
                    tracing::info!(session_id, "lobby session assigned");
                    self.session_tx.send_replace(Some(session_id.to_string()));
                }
            }
            ref kind if kind.is_ban_notice() => self.reconnect.arm_ban(),
            _ => {}
        }

        if frame.kind.is_notification() || frame.id.is_none() {
            self.router.dispatch(&frame);
            return;
        }
        if let Err(e) = self.pending.resolve(frame) {
            tracing::debug!(error = %e, "dropping orphan response");
        }
    }

    /// The peer never confirmed a requested close. Dropping the socket
    /// tells the transport to tear the connection down.
    fn handle_close_timeout(&mut self) {
        if self.state != ConnectionState::Disconnecting {
            return;
        }
        tracing::warn!(
            timeout = ?self.config.connect_timeout,
            "lobby did not confirm close, dropping connection"
        );
        self.socket = None;
        self.handle_closed(CloseCode::NORMAL);
    }

    /// The socket is gone: sweep, update state, then tell listeners.
    fn handle_closed(&mut self, code: CloseCode) {
        self.close_deadline = None;
        let previous = self.state;
        self.pending.sweep_all(code);
        self.transition(ConnectionEvent::TransportClosed);

        match previous {
            ConnectionState::Disconnecting => {
                tracing::info!(%code, "disconnected from lobby");
                self.emit(LobbyEvent::Disconnected {
                    code,
                    reason: DisconnectReason::Requested,
                });
            }
            ConnectionState::Connected => {
                tracing::info!(%code, "lobby connection lost");
                let decision = self
                    .reconnect
                    .on_unexpected_close(now(), code.is_server_policy());
                self.apply_decision(decision, code, true);
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }
    }

    /// Acts on what the reconnect controller decided. `closed` is `true`
    /// when a live connection just ended (as opposed to a failed attempt).
    fn apply_decision(
        &mut self,
        decision: ReconnectDecision,
        code: CloseCode,
        closed: bool,
    ) {
        match decision {
            ReconnectDecision::Retry(delay) => {
                if closed {
                    self.emit(LobbyEvent::Disconnected {
                        code,
                        reason: DisconnectReason::Unexpected,
                    });
                }
                self.retries += 1;
                self.retry_at = Some(Instant::now() + delay);
                tracing::info!(attempt = self.retries, ?delay, "reconnect scheduled");
                self.emit(LobbyEvent::Reconnecting {
                    attempt: self.retries,
                    delay,
                });
            }
            ReconnectDecision::AwaitToken => {
                tracing::info!("waiting for a fresh access token to reconnect");
                self.emit(LobbyEvent::Disconnected {
                    code,
                    reason: DisconnectReason::Banned,
                });
            }
            ReconnectDecision::Stop(stop) => {
                let reason = match stop {
                    StopReason::RetryExhausted => {
                        tracing::warn!(
                            attempts = self.retries,
                            "giving up on reconnecting"
                        );
                        DisconnectReason::RetryExhausted
                    }
                    StopReason::ServerPolicy => DisconnectReason::ServerPolicy,
                    StopReason::Disabled => DisconnectReason::Unexpected,
                };
                self.token_watch = None;
                self.retries = 0;
                self.emit(LobbyEvent::Disconnected { code, reason });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Token updates
    // -----------------------------------------------------------------------

    fn handle_token_updated(&mut self) {
        if self.reconnect.on_token_updated() {
            tracing::info!("fresh access token received, reconnecting");
            self.start_attempt();
            return;
        }
        if self.state.is_connected() {
            if let Some(token) = self.credentials.access_token() {
                self.refresh_token(&token);
            }
        }
    }

    /// Sends `refreshTokenRequest` and logs the outcome when it arrives.
    fn refresh_token(&mut self, token: &AccessToken) {
        let id = self.ids.next_id();
        let frame = Frame::request(
            MessageType::RefreshTokenRequest,
            id,
            Fields::new().with("token", token.as_str()),
        );
        let (reply, rx) = oneshot::channel();
        self.handle_send(frame, MessageType::RefreshTokenResponse, reply);

        tokio::spawn(async move {
            match rx.await {
                Ok(Ok(_)) => tracing::info!(%id, "access token refreshed"),
                Ok(Err(e)) => tracing::warn!(%id, error = %e, "token refresh failed"),
                Err(_) => {}
            }
        });
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn transition(&mut self, event: ConnectionEvent) {
        match self.state.on(event) {
            Ok(next) if next != self.state => {
                tracing::debug!(from = %self.state, to = %next, "connection state changed");
                self.state = next;
                self.state_tx.send_replace(next);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "ignored connection event"),
        }
    }

    fn emit(&self, event: LobbyEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn next_socket_event(socket: &mut Option<Socket>) -> SocketEvent {
    match socket {
        Some(socket) => socket.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Resolves to `true` on a token update, `false` if the store is gone.
async fn token_changed(watch: &mut Option<TokenWatch>) -> bool {
    match watch {
        Some(watch) => watch.changed().await.is_ok(),
        None => future::pending().await,
    }
}

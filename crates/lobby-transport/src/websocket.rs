//! WebSocket client transport using `tokio-tungstenite`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{
    CloseCode, OpenRequest, Outbound, Socket, SocketPeer, Transport,
    TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for [`WebSocketTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Interval between keep-alive pings. `None` disables pinging.
    ///
    /// Default: 10 seconds.
    pub ping_interval: Option<Duration>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: Some(Duration::from_secs(10)),
        }
    }
}

/// A [`Transport`] that dials the lobby over WebSocket.
///
/// Each successful [`open`](Transport::open) spawns one pump task that owns
/// the stream: it writes queued [`Outbound`] commands, forwards incoming
/// text as [`SocketEvent::Message`](crate::SocketEvent::Message), sends
/// pings, and reports exactly one `Closed` event when the stream ends.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Creates a transport with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport with the given settings.
    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        request: OpenRequest,
    ) -> impl Future<Output = Result<Socket, TransportError>> + Send {
        let ping_interval = self.config.ping_interval;
        async move {
            let mut upgrade = request
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            for (name, value) in &request.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| {
                        TransportError::InvalidRequest(e.to_string())
                    })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    TransportError::InvalidRequest(e.to_string())
                })?;
                upgrade.headers_mut().insert(name, value);
            }

            let (ws, _response) = tokio_tungstenite::connect_async(upgrade)
                .await
                .map_err(|e| {
                    TransportError::ConnectFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        e,
                    ))
                })?;

            tracing::debug!(url = %request.url, "WebSocket connected");

            let (socket, peer) = Socket::pair();
            tokio::spawn(pump(ws, peer, ping_interval));
            Ok(socket)
        }
    }
}

/// Moves data between the WebSocket stream and the socket channels until
/// either side ends, then reports the close code.
async fn pump(
    ws: WsStream,
    mut peer: SocketPeer,
    ping_interval: Option<Duration>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut pings = ping_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    let code = loop {
        tokio::select! {
            cmd = peer.next_outbound() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::debug!(error = %e, "WebSocket send failed");
                        break CloseCode::ABNORMAL;
                    }
                }
                Some(Outbound::Close(code)) => {
                    let frame = CloseFrame {
                        code: code.0.into(),
                        reason: "".into(),
                    };
                    if sink.send(Message::Close(Some(frame))).await.is_err() {
                        break code;
                    }
                    // Keep reading: the close completes when the server
                    // echoes the close frame.
                }
                None => {
                    // The lobby dropped its end; nobody is listening.
                    let _ = sink.close().await;
                    break CloseCode::NORMAL;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    peer.deliver(text.as_str());
                }
                Some(Ok(Message::Binary(data))) => {
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            peer.deliver(text);
                        }
                        Err(_) => {
                            tracing::debug!("dropping non-UTF-8 binary message");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = sink.close().await;
                    break frame
                        .map(|f| CloseCode(u16::from(f.code)))
                        .unwrap_or(CloseCode::NO_STATUS);
                }
                Some(Ok(_)) => {} // ping/pong/raw frame
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    break CloseCode::ABNORMAL;
                }
                None => break CloseCode::ABNORMAL,
            },

            _ = next_ping(&mut pings) => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break CloseCode::ABNORMAL;
                }
            }
        }
    };

    tracing::debug!(%code, "WebSocket closed");
    peer.closed(code);
}

async fn next_ping(pings: &mut Option<Interval>) {
    match pings {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

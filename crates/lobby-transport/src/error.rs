/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The URL or one of the handshake headers could not be used to build
    /// an upgrade request.
    #[error("invalid open request: {0}")]
    InvalidRequest(String),

    /// The remote endpoint refused or failed the WebSocket handshake.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The socket is gone; its pump task has already exited.
    #[error("connection closed")]
    ConnectionClosed,

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
}

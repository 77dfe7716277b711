//! Integration tests for the WebSocket client transport.
//!
//! These tests spin up a real `tokio-tungstenite` server on a random port
//! and open connections to it with [`WebSocketTransport`], so data flows
//! over an actual TCP socket.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use lobby_transport::{
        CloseCode, OpenRequest, SocketEvent, Transport, TransportError,
        WebSocketConfig, WebSocketTransport,
    };
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request, Response,
    };
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its `ws://` URL.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    /// Accepts one connection and reports the `Authorization` header it
    /// was opened with.
    async fn accept_one(
        listener: TcpListener,
        auth_tx: oneshot::Sender<Option<String>>,
    ) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_hdr_async(
            stream,
            move |req: &Request, resp: Response| {
                let auth = req
                    .headers()
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let _ = auth_tx.send(auth);
                Ok(resp)
            },
        )
        .await
        .expect("handshake should succeed")
    }

    fn transport() -> WebSocketTransport {
        WebSocketTransport::with_config(WebSocketConfig {
            ping_interval: None,
        })
    }

    #[tokio::test]
    async fn test_open_sends_headers_and_exchanges_text() {
        let (listener, url) = listen().await;
        let (auth_tx, auth_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, auth_tx));

        let mut socket = transport()
            .open(OpenRequest::new(url).header("Authorization", "Bearer abc"))
            .await
            .expect("open should succeed");
        let mut server_ws = server.await.expect("server task");

        assert_eq!(auth_rx.await.unwrap().as_deref(), Some("Bearer abc"));

        // --- Client sends, server receives ---
        socket.send("type: ping\nid: 1".into()).unwrap();
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "type: ping\nid: 1");

        // --- Server sends, client receives ---
        server_ws
            .send(Message::Text("type: connectNotif".into()))
            .await
            .unwrap();
        assert_eq!(
            socket.recv().await,
            SocketEvent::Message("type: connectNotif".into())
        );
    }

    #[tokio::test]
    async fn test_server_close_code_is_reported() {
        let (listener, url) = listen().await;
        let (auth_tx, _auth_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, auth_tx));

        let mut socket =
            transport().open(OpenRequest::new(url)).await.unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws
            .close(Some(CloseFrame {
                code: 4003u16.into(),
                reason: "banned".into(),
            }))
            .await
            .unwrap();

        assert_eq!(socket.recv().await, SocketEvent::Closed(CloseCode(4003)));
    }

    #[tokio::test]
    async fn test_client_close_completes_with_echoed_code() {
        let (listener, url) = listen().await;
        let (auth_tx, _auth_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, auth_tx));

        let mut socket =
            transport().open(OpenRequest::new(url)).await.unwrap();
        let mut server_ws = server.await.unwrap();

        // The server has to keep polling for tungstenite to echo the close.
        tokio::spawn(async move { while server_ws.next().await.is_some() {} });

        socket.close(CloseCode::NORMAL).unwrap();
        assert_eq!(socket.recv().await, SocketEvent::Closed(CloseCode::NORMAL));
    }

    #[tokio::test]
    async fn test_open_invalid_url_is_rejected() {
        let result = transport().open(OpenRequest::new("not a url")).await;
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_open_refused_connection_fails() {
        // Bind then drop so the port is very likely closed.
        let (listener, url) = listen().await;
        drop(listener);
        let result = transport().open(OpenRequest::new(url)).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}

//! Integration tests for the WebSocket dialer.
//!
//! Each test runs a loopback `tokio-tungstenite` server on an OS-assigned
//! port and drives the client side through the `Dialer`/`Connection` traits.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use roomwire_transport::{
        CLOSE_GOING_AWAY, Connection, DialRequest, Dialer, TransportError, WebSocketDialer,
    };
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener and returns it with its `ws://` URL.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("local addr");
        (listener, format!("ws://{addr}/room"))
    }

    /// Accepts one connection, reporting the `Roomwire-User` header seen in
    /// the upgrade request.
    async fn accept_one(listener: TcpListener, user_tx: oneshot::Sender<Option<String>>) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let user = req
                .headers()
                .get("Roomwire-User")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let _ = user_tx.send(user);
            Ok(resp)
        };
        tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .expect("server handshake")
    }

    #[tokio::test]
    async fn test_dial_sends_headers_and_frames_flow_both_ways() {
        let (listener, url) = listen().await;
        let (user_tx, user_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, user_tx));

        let conn = WebSocketDialer::new()
            .dial(&DialRequest::new(url).header("Roomwire-User", "alice"))
            .await
            .expect("dial");
        let mut server_ws = server.await.expect("server task");
        assert_eq!(user_rx.await.unwrap().as_deref(), Some("alice"));

        conn.send(&[30, 0, 0, 1]).await.expect("send");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), &[30, 0, 0, 1]);

        server_ws
            .send(Message::Binary(vec![1, 2, 3].into()))
            .await
            .unwrap();
        let mut buf = vec![9; 16];
        assert!(conn.recv(&mut buf).await.expect("recv"));
        assert_eq!(buf, vec![1, 2, 3], "previous contents are replaced");

        conn.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (listener, url) = listen().await;
        let (user_tx, _user_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, user_tx));

        let conn = std::sync::Arc::new(
            WebSocketDialer::new()
                .dial(&DialRequest::new(url))
                .await
                .expect("dial"),
        );
        let mut server_ws = server.await.unwrap();

        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                conn.recv(&mut buf).await.map(|_| buf)
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(2), conn.send(b"ping"))
            .await
            .expect("send must not wait for the reader")
            .expect("send");
        let echoed = server_ws.next().await.unwrap().unwrap().into_data();
        server_ws.send(Message::Binary(echoed)).await.unwrap();

        let got = reader.await.unwrap().expect("recv");
        assert_eq!(got, b"ping");
    }

    #[tokio::test]
    async fn test_close_frame_surfaces_code() {
        let (listener, url) = listen().await;
        let (user_tx, _user_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, user_tx));

        let conn = WebSocketDialer::new()
            .dial(&DialRequest::new(url))
            .await
            .expect("dial");
        let mut server_ws = server.await.unwrap();
        server_ws
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "room closed".into(),
            }))
            .await
            .unwrap();

        let err = conn
            .recv(&mut Vec::new())
            .await
            .expect_err("close frame is an error");
        match &err {
            TransportError::ClosedByPeer { code, reason } => {
                assert_eq!(*code, CLOSE_GOING_AWAY);
                assert_eq!(reason, "room closed");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_text_frame_is_rejected() {
        let (listener, url) = listen().await;
        let (user_tx, _user_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, user_tx));

        let conn = WebSocketDialer::new()
            .dial(&DialRequest::new(url))
            .await
            .expect("dial");
        let mut server_ws = server.await.unwrap();
        server_ws.send(Message::Text("hello".into())).await.unwrap();

        let mut buf = vec![7];
        let err = conn.recv(&mut buf).await.expect_err("text is not a room frame");
        assert!(matches!(err, TransportError::InvalidFrame("text")));
        assert!(!err.is_terminal());
        assert_eq!(buf, vec![7], "buffer untouched");
    }

    #[tokio::test]
    async fn test_dial_to_closed_port_fails() {
        let (listener, url) = listen().await;
        drop(listener);
        let result = WebSocketDialer::new().dial(&DialRequest::new(url)).await;
        assert!(matches!(result, Err(TransportError::DialFailed(_))));
    }

    #[tokio::test]
    async fn test_invalid_header_is_rejected_before_connecting() {
        let result = WebSocketDialer::new()
            .dial(&DialRequest::new("ws://127.0.0.1:1/room").header("bad header", "x"))
            .await;
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }
}

//! In-memory transport for tests.
//!
//! [`pair`] returns a dialer and a listener. Every successful dial hands the
//! listener a [`ServerEnd`] that plays the room server for that connection.
//!
//! ```rust
//! # tokio_test_block(async {
//! use roomwire_transport::mock;
//! use roomwire_transport::{Connection, DialRequest, Dialer};
//!
//! let (dialer, mut listener) = mock::pair();
//! let conn = dialer.dial(&DialRequest::new("mock://room")).await.unwrap();
//! let mut server = listener.accept().await.unwrap();
//!
//! server.send(vec![1, 2]);
//! let mut buf = Vec::new();
//! assert!(conn.recv(&mut buf).await.unwrap());
//! assert_eq!(buf, [1, 2]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f);
//! # }
//! ```

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, DialRequest, Dialer, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
enum Inbound {
    Frame(Vec<u8>),
    Text,
    Close { code: u16, reason: String },
}

/// Creates a connected dialer/listener pair.
pub fn pair() -> (MockDialer, MockListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dialer = MockDialer {
        accepts: tx,
        refuse: Arc::new(AtomicU32::new(0)),
    };
    (dialer, MockListener { accepts: rx })
}

/// Dialer side of [`pair`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MockDialer {
    accepts: mpsc::UnboundedSender<ServerEnd>,
    refuse: Arc<AtomicU32>,
}

impl MockDialer {
    /// Makes the next `count` dials fail with [`TransportError::DialFailed`].
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }
}

impl Dialer for MockDialer {
    type Connection = MockConnection;

    async fn dial(&self, request: &DialRequest) -> Result<Self::Connection, TransportError> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::DialFailed(io::ErrorKind::ConnectionRefused.into()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let server = ServerEnd {
            request: request.clone(),
            to_client,
            from_client,
        };
        self.accepts
            .send(server)
            .map_err(|_| TransportError::DialFailed(io::ErrorKind::ConnectionRefused.into()))?;

        Ok(MockConnection {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            inbound: tokio::sync::Mutex::new(inbound),
            outbound: Mutex::new(Some(outbound)),
        })
    }
}

/// Listener side of [`pair`].
#[derive(Debug)]
pub struct MockListener {
    accepts: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MockListener {
    /// Waits for the next dial. `None` once every dialer is dropped.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accepts.recv().await
    }
}

/// The server's view of one mock connection. Dropping it ends the client's
/// stream without a close frame.
#[derive(Debug)]
pub struct ServerEnd {
    request: DialRequest,
    to_client: mpsc::UnboundedSender<Inbound>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ServerEnd {
    /// The request the client dialed with.
    pub fn request(&self) -> &DialRequest {
        &self.request
    }

    /// Queues a frame for the client. False if the client is gone.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.to_client.send(Inbound::Frame(frame)).is_ok()
    }

    /// Queues a text frame, which the room protocol never uses.
    pub fn send_text(&self) -> bool {
        self.to_client.send(Inbound::Text).is_ok()
    }

    /// Sends a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Inbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }

    /// Next frame from the client. `None` once the client closed or dropped
    /// the connection.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.recv().await
    }
}

/// Client side of a mock connection.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl Connection for MockConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(TransportError::Closed);
        };
        tx.send(data.to_vec())
            .map_err(|_| TransportError::SendFailed(io::ErrorKind::BrokenPipe.into()))
    }

    async fn recv(&self, buf: &mut Vec<u8>) -> Result<bool, TransportError> {
        match self.inbound.lock().await.recv().await {
            Some(Inbound::Frame(frame)) => {
                buf.clear();
                buf.extend_from_slice(&frame);
                Ok(true)
            }
            Some(Inbound::Text) => Err(TransportError::InvalidFrame("text")),
            Some(Inbound::Close { code, reason }) => Err(TransportError::ClosedByPeer { code, reason }),
            None => Ok(false),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

//! The room connection: one logical session over many physical sockets.
//!
//! A spawned [`Connection`] runs this loop until it is shut down, the server
//! closes the room, or it fails for good:
//!
//! ```text
//! dial ──→ receiver ─┬─ PeerReady ──→ sender (resends from server's seq + 1)
//!   ↑                └─────────────→ pinger (every deadline / 3)
//!   │                         │
//!   └── sleep retry_interval ←┘ retryable failure of any duty
//! ```
//!
//! Each physical attempt runs its duties under a child cancellation token,
//! so a failure in one duty stops the other two before the next dial.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use roomwire_codec::{Dict, Registry};
use roomwire_protocol::{
    Event, EventFrame, MsgPool, ProtocolError, bearer, decode_event, generate_auth_data,
};
use roomwire_transport::{
    self as transport, CLOSE_GOING_AWAY, CLOSE_NORMAL, Connection as _, DialRequest, Dialer,
    TransportError,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{BufferLease, BufferPool, Outbox, SessionConfig, SessionError};

pub const HEADER_APP_ID: &str = "Roomwire-App";
pub const HEADER_USER_ID: &str = "Roomwire-User";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_LAST_EVENT_SEQ: &str = "Roomwire-LastEventSeq";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Everything needed to connect, and reconnect, to one room.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Room socket endpoint from the lobby.
    pub url: String,
    pub app_id: String,
    pub user_id: String,
    /// Per-session key from the lobby. Signs connect auth data and messages.
    pub auth_key: String,
    /// Initial client deadline in seconds. Zero uses the configured default.
    pub client_deadline: u32,
}

/// Why a session ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner asked for it (leave, forced disconnect, or dropped room).
    Shutdown,
    /// The server closed the socket with a terminal code.
    ByPeer { code: u16, reason: String },
}

/// What the connection reports to its room.
#[derive(Debug)]
pub enum SessionEvent {
    /// A regular event. Delivered exactly once, in sequence order.
    Event(Event),
    /// Heartbeat reply.
    Pong {
        rtt: Duration,
        watchers: u32,
        last_msg_times: Dict,
    },
    /// Final notification: clean end.
    Closed(CloseReason),
    /// Final notification: the session failed.
    Failed(SessionError),
}

/// A [`SessionEvent`] plus the receive buffer it came from. Dropping the
/// delivery releases the buffer to the receiver.
#[derive(Debug)]
pub struct Delivery {
    pub event: SessionEvent,
    lease: Option<BufferLease>,
}

impl Delivery {
    fn new(event: SessionEvent) -> Self {
        Self { event, lease: None }
    }

    fn leased(event: SessionEvent, lease: BufferLease) -> Self {
        Self {
            event,
            lease: Some(lease),
        }
    }

    /// The raw frame this event was decoded from. `None` for final
    /// notifications.
    pub fn frame(&self) -> Option<&[u8]> {
        self.lease.as_ref().map(BufferLease::as_slice)
    }

    /// Splits the event from its buffer. Hold on to the lease until the
    /// event is handled to keep the receiver's backpressure accurate.
    pub fn into_parts(self) -> (SessionEvent, Option<BufferLease>) {
        (self.event, self.lease)
    }
}

/// The first error the owner reported through [`ConnectionHandle::fail`].
type Fault = Arc<Mutex<Option<SessionError>>>;

/// Controls a running [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    cancel: CancellationToken,
    done: CancellationToken,
    deadline: Arc<watch::Sender<u32>>,
    outbox: Arc<Outbox>,
    fault: Fault,
}

impl ConnectionHandle {
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Posts a message through the outbox.
    ///
    /// Running out of pool slots or sequence numbers breaks the message
    /// stream for good: the session fails with the same error, which is
    /// also returned.
    pub fn post<F>(&self, f: F) -> Result<u32, ProtocolError>
    where
        F: FnOnce(&mut MsgPool) -> Result<u32, ProtocolError>,
    {
        self.outbox.post(f).inspect_err(|e| {
            let fatal = match e {
                ProtocolError::PoolFull { seq, capacity } => ProtocolError::PoolFull {
                    seq: *seq,
                    capacity: *capacity,
                },
                ProtocolError::SeqOverflow => ProtocolError::SeqOverflow,
                _ => return,
            };
            self.fail(fatal.into());
        })
    }

    /// Ends the session with [`SessionEvent::Failed`] carrying `error`.
    /// Only the first reported error is kept.
    pub fn fail(&self, error: SessionError) {
        {
            let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
            if fault.is_none() && !self.done.is_cancelled() {
                tracing::warn!(error = %error, "failing room session");
                *fault = Some(error);
            }
        }
        self.cancel.cancel();
    }

    /// Changes the heartbeat period to a third of `secs`.
    pub fn set_client_deadline(&self, secs: u32) {
        self.deadline.send_replace(secs);
    }

    /// Stops all duties and ends the session with [`CloseReason::Shutdown`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the session has ended and sent its final notification.
    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Waits until the session has ended.
    pub async fn closed(&self) {
        self.done.cancelled().await;
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// State shared by the lifecycle loop and the duties of every attempt.
struct Shared {
    outbox: Arc<Outbox>,
    buffers: BufferPool,
    registry: Arc<Registry>,
    events: mpsc::UnboundedSender<Delivery>,
    /// Last regular event accepted. Sent on reconnect so the server resumes
    /// right after it.
    last_event_seq: AtomicU32,
    config: SessionConfig,
}

/// How a duty, and therefore an attempt, ended without an error.
#[derive(Debug)]
enum DutyEnd {
    Cancelled,
    RoomGone,
    Closed { code: u16, reason: String },
}

type DutyResult = Result<DutyEnd, SessionError>;

/// The lifecycle task of one room session.
pub struct Connection<D: Dialer> {
    dialer: D,
    request: ConnectRequest,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    deadline: Arc<watch::Sender<u32>>,
    fault: Fault,
}

impl<D: Dialer> Connection<D> {
    /// Starts the session on the current tokio runtime.
    ///
    /// Events go to `events`; the last one is always a
    /// [`SessionEvent::Closed`] or [`SessionEvent::Failed`].
    pub fn spawn(
        dialer: D,
        request: ConnectRequest,
        config: SessionConfig,
        outbox: Arc<Outbox>,
        registry: Arc<Registry>,
        events: mpsc::UnboundedSender<Delivery>,
    ) -> ConnectionHandle {
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let (deadline, _) = watch::channel(request.client_deadline);
        let deadline = Arc::new(deadline);
        let fault = Fault::default();

        let shared = Arc::new(Shared {
            outbox: Arc::clone(&outbox),
            buffers: BufferPool::new(config.event_buffers),
            registry,
            events,
            last_event_seq: AtomicU32::new(0),
            config,
        });
        let conn = Self {
            dialer,
            request,
            shared,
            cancel: cancel.clone(),
            deadline: Arc::clone(&deadline),
            fault: Arc::clone(&fault),
        };
        tokio::spawn(conn.run(done.clone()));

        ConnectionHandle {
            cancel,
            done,
            deadline,
            outbox,
            fault,
        }
    }

    async fn run(self, done: CancellationToken) {
        let result = self.lifecycle().await;
        let fault = self
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let event = match fault.map_or(result, Err) {
            Ok(reason) => {
                tracing::info!(url = %self.request.url, ?reason, "room connection closed");
                SessionEvent::Closed(reason)
            }
            Err(e) => {
                tracing::warn!(url = %self.request.url, error = %e, "room connection failed");
                SessionEvent::Failed(e)
            }
        };
        let _ = self.shared.events.send(Delivery::new(event));
        self.cancel.cancel();
        done.cancel();
    }

    async fn lifecycle(&self) -> Result<CloseReason, SessionError> {
        let config = &self.shared.config;
        let mut failures = 0u32;
        loop {
            tracing::debug!(url = %self.request.url, attempt = failures + 1, "dialing room");
            let (result, handshaken) = self.connect_once().await;
            if handshaken {
                failures = 0;
            }
            let err = match result {
                Ok(DutyEnd::Cancelled | DutyEnd::RoomGone) => return Ok(CloseReason::Shutdown),
                Ok(DutyEnd::Closed { code, reason }) => {
                    return Ok(CloseReason::ByPeer { code, reason });
                }
                Err(e) => e,
            };
            if !err.is_retryable() {
                return Err(err);
            }

            failures += 1;
            if failures > config.max_reconnect {
                return Err(SessionError::ReconnectLimit {
                    attempts: failures,
                    last: Box::new(err),
                });
            }
            tracing::warn!(
                url = %self.request.url,
                attempt = failures,
                error = %err,
                "room connection lost, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(CloseReason::Shutdown),
                _ = tokio::time::sleep(config.retry_interval) => {}
            }
        }
    }

    fn dial_request(&self) -> Result<DialRequest, SessionError> {
        let auth = generate_auth_data(self.request.auth_key.as_bytes(), &self.request.user_id)?;
        let last_event_seq = self.shared.last_event_seq.load(Ordering::Acquire);
        Ok(DialRequest::new(self.request.url.as_str())
            .header(HEADER_APP_ID, self.request.app_id.as_str())
            .header(HEADER_USER_ID, self.request.user_id.as_str())
            .header(HEADER_AUTHORIZATION, bearer(&auth))
            .header(HEADER_LAST_EVENT_SEQ, last_event_seq.to_string()))
    }

    /// Runs one physical connection to its end. The flag reports whether
    /// the server's ready event arrived.
    async fn connect_once(&self) -> (DutyResult, bool) {
        let request = match self.dial_request() {
            Ok(r) => r,
            Err(e) => return (Err(e), false),
        };
        let dialed = tokio::select! {
            _ = self.cancel.cancelled() => return (Ok(DutyEnd::Cancelled), false),
            r = tokio::time::timeout(
                self.shared.config.handshake_timeout,
                self.dialer.dial(&request),
            ) => r,
        };
        let conn = match dialed {
            Ok(Ok(conn)) => Arc::new(conn),
            Ok(Err(e)) => return (Err(e.into()), false),
            Err(_) => return (Err(SessionError::HandshakeTimeout), false),
        };
        let conn_id = conn.id();
        tracing::debug!(%conn_id, "room socket open, waiting for peer ready");

        let attempt = self.cancel.child_token();
        let (ready_tx, ready_rx) = watch::channel(None);
        let mut duties: JoinSet<DutyResult> = JoinSet::new();
        duties.spawn(receive(
            Arc::clone(&conn),
            Arc::clone(&self.shared),
            ready_tx,
            attempt.clone(),
        ));
        duties.spawn(send_messages(
            Arc::clone(&conn),
            Arc::clone(&self.shared.outbox),
            ready_rx.clone(),
            attempt.clone(),
        ));
        duties.spawn(send_pings(
            Arc::clone(&conn),
            Arc::clone(&self.shared),
            ready_rx.clone(),
            self.deadline.subscribe(),
            attempt.clone(),
        ));

        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(DutyEnd::Cancelled),
                joined = duties.join_next() => match joined {
                    Some(Ok(Ok(DutyEnd::Cancelled))) => continue,
                    Some(Ok(result)) => break result,
                    Some(Err(e)) => break Err(SessionError::Internal(e.to_string())),
                    None => break Err(SessionError::Disconnected),
                },
            }
        };

        attempt.cancel();
        while duties.join_next().await.is_some() {}
        if let Err(e) = conn.close().await {
            tracing::debug!(%conn_id, error = %e, "closing room socket failed");
        }
        let handshaken = ready_rx.borrow().is_some();
        (result, handshaken)
    }
}

// ---------------------------------------------------------------------------
// Duties
// ---------------------------------------------------------------------------

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Waits for the ready event. Returns the server's last received message
/// seq, or `None` when cancelled first.
async fn wait_ready(
    ready: &mut watch::Receiver<Option<u32>>,
    cancel: &CancellationToken,
) -> Option<u32> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        r = ready.wait_for(Option::is_some) => r.ok().and_then(|seq| *seq),
    }
}

/// Reads frames, enforces event ordering and forwards events to the room.
async fn receive<C: transport::Connection>(
    conn: Arc<C>,
    shared: Arc<Shared>,
    ready: watch::Sender<Option<u32>>,
    cancel: CancellationToken,
) -> DutyResult {
    let handshake = tokio::time::sleep(shared.config.handshake_timeout);
    tokio::pin!(handshake);
    let mut handshaken = false;

    loop {
        // Buffers still held by the room must not stall the handshake.
        let lease = tokio::select! {
            _ = cancel.cancelled() => return Ok(DutyEnd::Cancelled),
            _ = &mut handshake, if !handshaken => return Err(SessionError::HandshakeTimeout),
            lease = shared.buffers.acquire() => lease,
        };
        let Some(mut lease) = lease else {
            return Err(SessionError::Internal("receive buffer pool closed".into()));
        };

        let received = tokio::select! {
            _ = cancel.cancelled() => return Ok(DutyEnd::Cancelled),
            _ = &mut handshake, if !handshaken => return Err(SessionError::HandshakeTimeout),
            r = conn.recv(lease.as_mut_vec()) => r,
        };
        match received {
            Ok(true) => {}
            Ok(false) => return Err(SessionError::Disconnected),
            Err(TransportError::ClosedByPeer { code, reason })
                if code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY =>
            {
                return Ok(DutyEnd::Closed { code, reason });
            }
            Err(TransportError::InvalidFrame(kind)) => {
                return Err(ProtocolError::InvalidMessage(format!("{kind} frame")).into());
            }
            Err(e) => return Err(e.into()),
        }

        let EventFrame { seq, event } = decode_event(lease.as_slice(), &shared.registry)?;
        let delivery = match (seq, event) {
            (_, Event::PeerReady { last_msg_seq }) => {
                tracing::debug!(last_msg_seq, "peer ready");
                handshaken = true;
                ready.send_replace(Some(last_msg_seq));
                continue;
            }
            (_, Event::Pong(pong)) => {
                let rtt = Duration::from_millis(unix_millis().saturating_sub(pong.ping_timestamp));
                let event = SessionEvent::Pong {
                    rtt,
                    watchers: pong.watchers,
                    last_msg_times: pong.last_msg_times,
                };
                Delivery::leased(event, lease)
            }
            (Some(seq), event) => {
                let expected = shared.last_event_seq.load(Ordering::Acquire).wrapping_add(1);
                if seq != expected {
                    return Err(SessionError::SequenceGap { expected, got: seq });
                }
                shared.last_event_seq.store(seq, Ordering::Release);
                tracing::trace!(seq, kind = ?event.event_type(), "event received");
                Delivery::leased(SessionEvent::Event(event), lease)
            }
            (None, event) => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{:?} without sequence number",
                    event.event_type()
                ))
                .into());
            }
        };
        if shared.events.send(delivery).is_err() {
            return Ok(DutyEnd::RoomGone);
        }
    }
}

/// Drains the outbox in seq order, starting right after what the server
/// already has.
async fn send_messages<C: transport::Connection>(
    conn: Arc<C>,
    outbox: Arc<Outbox>,
    mut ready: watch::Receiver<Option<u32>>,
    cancel: CancellationToken,
) -> DutyResult {
    let Some(resume) = wait_ready(&mut ready, &cancel).await else {
        return Ok(DutyEnd::Cancelled);
    };
    let mut next = resume.wrapping_add(1);
    if next <= outbox.latest() {
        tracing::debug!(from = next, to = outbox.latest(), "resending messages");
    }

    loop {
        let frame = match outbox.take(next)? {
            Some(frame) => frame,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(DutyEnd::Cancelled),
                    _ = outbox.available() => {}
                }
                continue;
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => return Ok(DutyEnd::Cancelled),
            r = conn.send(&frame) => r?,
        }
        tracing::trace!(seq = next, "message sent");
        next += 1;
    }
}

/// Sends a signed heartbeat every third of the client deadline.
async fn send_pings<C: transport::Connection>(
    conn: Arc<C>,
    shared: Arc<Shared>,
    mut ready: watch::Receiver<Option<u32>>,
    mut deadline: watch::Receiver<u32>,
    cancel: CancellationToken,
) -> DutyResult {
    if wait_ready(&mut ready, &cancel).await.is_none() {
        return Ok(DutyEnd::Cancelled);
    }

    loop {
        let frame = shared.outbox.ping(unix_millis());
        tokio::select! {
            _ = cancel.cancelled() => return Ok(DutyEnd::Cancelled),
            r = conn.send(&frame) => r?,
        }

        // A deadline change restarts the wait with the new period.
        loop {
            let interval = shared.config.ping_interval(*deadline.borrow_and_update());
            tokio::select! {
                _ = cancel.cancelled() => return Ok(DutyEnd::Cancelled),
                _ = tokio::time::sleep(interval) => break,
                changed = deadline.changed() => {
                    if changed.is_err() {
                        return Ok(DutyEnd::Cancelled);
                    }
                    tracing::debug!(deadline = *deadline.borrow(), "client deadline changed");
                }
            }
        }
    }
}

//! Connection handles.
//!
//! A [`ConnectionHandle`] is the relay's view of one participant's duplex
//! link. Outgoing payloads go through a bounded queue drained by a dedicated
//! writer task ([`write_outbound`]), so concurrent senders are serialized by
//! the queue and a slow socket never blocks whoever is sending.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use futures::{Sink, SinkExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::SendError;
use super::payload::EncodedPayload;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Close code and reason sent to the peer when the relay ends a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: Cow<'static, str>,
}

impl CloseReason {
    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self {
            code,
            reason: Cow::Borrowed(reason),
        }
    }

    pub const fn normal() -> Self {
        Self::new(1000, "")
    }

    pub const fn going_away() -> Self {
        Self::new(1001, "server shutting down")
    }

    pub const fn delivery_failed() -> Self {
        Self::new(1011, "delivery failed")
    }

    pub const fn room_not_found() -> Self {
        Self::new(4404, "room not found")
    }
}

/// Transport-neutral frame exchanged with a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close(Option<CloseReason>),
}

struct Shared {
    id: ConnectionId,
    sender: mpsc::Sender<EncodedPayload>,
    token: CancellationToken,
    close_reason: OnceLock<CloseReason>,
}

/// Cheaply clonable handle to one participant's connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Create a handle with an outbound queue of `buffer` payloads.
    ///
    /// The returned [`OutboundQueue`] must be drained (usually by
    /// [`write_outbound`]) for sends to keep succeeding.
    pub fn new(buffer: usize) -> (Self, OutboundQueue) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            shared: Arc::new(Shared {
                id: ConnectionId::next(),
                sender,
                token: CancellationToken::new(),
                close_reason: OnceLock::new(),
            }),
        };
        let queue = OutboundQueue {
            receiver,
            handle: handle.clone(),
        };
        (handle, queue)
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Queue a payload for delivery. Never waits.
    pub fn send(&self, payload: impl Into<EncodedPayload>) -> Result<(), SendError> {
        if self.shared.token.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.shared.sender.try_send(payload.into()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Backpressure,
            TrySendError::Closed(_) => SendError::Disconnected,
        })
    }

    /// Close the connection. Only the first reason is kept.
    pub fn close(&self, reason: CloseReason) {
        if self.shared.close_reason.set(reason).is_ok() {
            debug!("Closing {}", self.shared.id);
        }
        self.shared.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Resolves once the handle has been closed.
    pub async fn closed(&self) {
        self.shared.token.cancelled().await
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason.get().cloned()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving end of a connection's outbound queue.
pub struct OutboundQueue {
    receiver: mpsc::Receiver<EncodedPayload>,
    handle: ConnectionHandle,
}

impl OutboundQueue {
    /// Next payload to write, or `None` once the handle is closed.
    pub async fn next(&mut self) -> Option<EncodedPayload> {
        tokio::select! {
            biased;
            _ = self.handle.closed() => None,
            payload = self.receiver.recv() => payload,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

/// Drain `queue` into `sink` until the handle closes or the sink fails,
/// then send a close frame.
///
/// A failed write closes the handle so that the owning session stops
/// receiving too.
pub async fn write_outbound<S>(mut sink: S, mut queue: OutboundQueue)
where
    S: Sink<Frame> + Unpin,
    S::Error: fmt::Display,
{
    let id = queue.handle.id();

    while let Some(payload) = queue.next().await {
        if let Err(e) = sink.send(Frame::Text(payload.as_str().to_owned())).await {
            debug!("Write to {} failed: {}", id, e);
            queue.handle.close(CloseReason::delivery_failed());
            return;
        }
    }

    let reason = queue
        .handle
        .close_reason()
        .unwrap_or_else(CloseReason::normal);
    if let Err(e) = sink.send(Frame::Close(Some(reason))).await {
        debug!("Could not send close frame to {}: {}", id, e);
    }
    let _ = sink.close().await;
}

//! Broadcast engine.
//!
//! Sessions submit [`Envelope`]s to an unbounded queue; a single long-lived
//! task consumes the queue and fans each payload out to the other
//! participants of the sender's room. One queue with one consumer keeps
//! every sender's messages in the order they were received.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{CloseReason, ConnectionId};
use super::payload::Payload;
use super::registry::{RoomId, RoomRegistry};
use crate::server::metrics;

/// A payload tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub room_id: RoomId,
    pub sender: ConnectionId,
    pub payload: Payload,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Recipients that failed and were removed from the room.
    pub dropped: Vec<ConnectionId>,
    pub room_missing: bool,
}

/// The dispatcher queue is gone (the consumer task stopped).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dispatcher is not running")]
pub struct DispatcherStopped;

/// Producer side of the dispatcher queue. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Envelope>,
}

impl Dispatcher {
    /// Start the consumer task for `registry`.
    ///
    /// The task exits once every `Dispatcher` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(registry: Arc<RoomRegistry>) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                broadcast(
                    &registry,
                    &envelope.room_id,
                    envelope.sender,
                    envelope.payload,
                );
            }
            info!("Dispatcher stopped");
        });
        (Self { queue }, task)
    }

    /// Enqueue a payload for broadcast. Never waits.
    pub fn submit(&self, envelope: Envelope) -> Result<(), DispatcherStopped> {
        self.queue.send(envelope).map_err(|_| DispatcherStopped)
    }
}

/// Deliver `payload` to everyone in `room_id` except `sender`.
///
/// Recipients are attempted independently. One that cannot accept the
/// payload is closed and removed from the room so later broadcasts skip it;
/// none of this is reported back to the sender.
pub fn broadcast(
    registry: &RoomRegistry,
    room_id: &RoomId,
    sender: ConnectionId,
    payload: Payload,
) -> BroadcastReport {
    let recipients = match registry.participants_except(room_id, sender) {
        Ok(recipients) => recipients,
        Err(e) => {
            warn!("Dropping message from {}: {}", sender, e);
            return BroadcastReport {
                room_missing: true,
                ..Default::default()
            };
        }
    };

    let mut report = BroadcastReport::default();
    let encoded = payload.encode();
    for recipient in recipients {
        let connection = &recipient.connection;
        match connection.send(encoded.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                debug!(
                    "Delivery to {} in room {} failed: {}",
                    connection.id(),
                    room_id,
                    e
                );
                connection.close(CloseReason::delivery_failed());
                registry.leave(room_id, connection.id());
                report.dropped.push(connection.id());
            }
        }
    }

    metrics::record_broadcast(report.delivered, report.dropped.len());
    report
}

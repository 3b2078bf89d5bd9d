//! Per-connection session loop.
//!
//! A session goes `Connecting -> Joined -> Receiving -> (Closed | Errored)`.
//! It joins the room, spawns the connection's writer, then feeds every
//! inbound payload to the dispatcher until the peer goes away. Leaving the
//! room is tied to a guard, so it happens on every exit path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, Stream, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use super::connection::{write_outbound, CloseReason, ConnectionHandle, ConnectionId, Frame};
use super::dispatcher::Envelope;
use super::error::{EncodingError, ReceiveError, RelayError};
use super::payload::Payload;
use super::registry::{RoomId, RoomRegistry};
use super::Relay;
use crate::server::metrics;

/// How long the writer gets to flush its close frame before being aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Receiving,
    Closed,
    Errored,
}

/// Why a session ended.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Join(#[from] RelayError),
    #[error(transparent)]
    Receive(#[from] ReceiveError),
}

#[derive(Debug)]
pub enum SessionOutcome {
    /// The peer closed the connection, or its stream ended.
    Closed,
    /// The relay closed the connection (e.g. delivery to it failed).
    ClosedByRelay(CloseReason),
    Errored(SessionError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Closed | SessionOutcome::ClosedByRelay(_) => SessionState::Closed,
            SessionOutcome::Errored(_) => SessionState::Errored,
        }
    }
}

/// Removes the connection from its room and closes it when dropped.
///
/// Closing ends the writer task, which then flushes a close frame and
/// releases the sink, even if the session itself was aborted.
struct Membership {
    registry: Arc<RoomRegistry>,
    room_id: RoomId,
    handle: ConnectionHandle,
}

impl Drop for Membership {
    fn drop(&mut self) {
        let connection = self.handle.id();
        if self.registry.leave(&self.room_id, connection) {
            debug!("{} left room {}", connection, self.room_id);
        }
        self.handle.close(CloseReason::normal());
        metrics::record_session_ended();
    }
}

struct SessionLog<'a> {
    room_id: &'a RoomId,
    connection: ConnectionId,
}

impl SessionLog<'_> {
    fn enter(&self, state: SessionState) {
        debug!("{} in room {}: {:?}", self.connection, self.room_id, state);
    }
}

/// Run one participant's session to completion.
///
/// `inbound` yields frames read from the peer; `outbound` receives frames to
/// write. Both are transport-neutral so any duplex link can be plugged in.
pub async fn run_session<I, O>(
    relay: Arc<Relay>,
    room_id: RoomId,
    host: bool,
    mut inbound: I,
    outbound: O,
) -> SessionOutcome
where
    I: Stream<Item = Result<Frame, ReceiveError>> + Unpin + Send,
    O: Sink<Frame> + Unpin + Send + 'static,
    O::Error: fmt::Display,
{
    let (handle, queue) = ConnectionHandle::new(relay.settings().outgoing_buffer);
    let log = SessionLog {
        room_id: &room_id,
        connection: handle.id(),
    };
    log.enter(SessionState::Connecting);

    let mut writer = tokio::spawn(write_outbound(outbound, queue));

    if let Err(e) = relay.registry().join(&room_id, handle.clone(), host) {
        warn!("{} could not join: {}", handle.id(), e);
        log.enter(SessionState::Errored);
        handle.close(CloseReason::room_not_found());
        finish_writer(&mut writer).await;
        return SessionOutcome::Errored(e.into());
    }
    let membership = Membership {
        registry: relay.registry().clone(),
        room_id: room_id.clone(),
        handle: handle.clone(),
    };
    metrics::record_session_started();
    info!("{} joined room {} (host: {})", handle.id(), room_id, host);
    log.enter(SessionState::Joined);

    log.enter(SessionState::Receiving);
    let outcome = receive_loop(&relay, &room_id, &handle, &mut inbound).await;
    log.enter(outcome.state());

    drop(membership);
    finish_writer(&mut writer).await;

    info!("{} left room {}: {:?}", handle.id(), room_id, outcome);
    outcome
}

async fn receive_loop<I>(
    relay: &Relay,
    room_id: &RoomId,
    handle: &ConnectionHandle,
    inbound: &mut I,
) -> SessionOutcome
where
    I: Stream<Item = Result<Frame, ReceiveError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = handle.closed() => {
                let reason = handle.close_reason().unwrap_or_else(CloseReason::normal);
                return SessionOutcome::ClosedByRelay(reason);
            }
            next = inbound.next() => next,
        };

        let frame = match next {
            None | Some(Ok(Frame::Close(_))) => return SessionOutcome::Closed,
            Some(Err(e)) => return SessionOutcome::Errored(e.into()),
            Some(Ok(frame)) => frame,
        };

        let payload = match frame {
            Frame::Text(text) => Payload::parse(&text),
            Frame::Binary(_) => Err(EncodingError::BinaryFrame),
            Frame::Ping | Frame::Pong | Frame::Close(_) => continue,
        };

        match payload {
            Ok(payload) => {
                let envelope = Envelope {
                    room_id: room_id.clone(),
                    sender: handle.id(),
                    payload,
                };
                if relay.dispatcher().submit(envelope).is_err() {
                    warn!("Dispatcher unavailable, dropping message from {}", handle.id());
                }
            }
            Err(e) => {
                debug!("Dropping malformed message from {}: {}", handle.id(), e);
                metrics::record_malformed_payload();
                // Best effort; a full queue just loses the notice.
                let _ = handle.send(error_notice(e.code(), &e.to_string()));
            }
        }
    }
}

async fn finish_writer(writer: &mut tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(CLOSE_GRACE, &mut *writer).await.is_err() {
        debug!("Writer did not finish in time, aborting");
        writer.abort();
    }
}

/// Notice sent back to a sender whose message could not be relayed.
pub fn error_notice(code: &str, message: &str) -> Payload {
    let value = json!({
        "type": "error",
        "code": code,
        "message": message,
    });
    // json! with an object literal is always an object.
    Payload::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelaySettings;
    use futures::channel::mpsc as fmpsc;
    use tokio::time::timeout;

    type Inbound = fmpsc::UnboundedSender<Result<Frame, ReceiveError>>;
    type Outbound = fmpsc::UnboundedReceiver<Frame>;

    struct Peer {
        inbound: Inbound,
        outbound: Outbound,
        session: tokio::task::JoinHandle<SessionOutcome>,
    }

    impl Peer {
        fn send_text(&self, text: &str) {
            self.inbound
                .unbounded_send(Ok(Frame::Text(text.to_string())))
                .unwrap();
        }

        async fn recv(&mut self) -> Option<Frame> {
            timeout(Duration::from_millis(500), self.outbound.next())
                .await
                .ok()
                .flatten()
        }

        async fn recv_json(&mut self) -> serde_json::Value {
            match self.recv().await {
                Some(Frame::Text(text)) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected a text frame, got {:?}", other),
            }
        }

        async fn assert_silent(&mut self) {
            let got = timeout(Duration::from_millis(100), self.outbound.next()).await;
            assert!(got.is_err(), "expected no frame, got {:?}", got);
        }
    }

    fn relay() -> Arc<Relay> {
        Arc::new(Relay::new(RelaySettings::default()))
    }

    fn connect(relay: &Arc<Relay>, room_id: &RoomId, host: bool) -> Peer {
        let (inbound, inbound_rx) = fmpsc::unbounded();
        let (outbound_tx, outbound) = fmpsc::unbounded();
        let session = tokio::spawn(run_session(
            relay.clone(),
            room_id.clone(),
            host,
            inbound_rx,
            outbound_tx,
        ));
        Peer {
            inbound,
            outbound,
            session,
        }
    }

    async fn wait_for_participants(relay: &Relay, room_id: &RoomId, count: usize) {
        timeout(Duration::from_secs(1), async {
            loop {
                let current = relay
                    .registry()
                    .snapshot(room_id)
                    .map(|s| s.participants.len());
                if current == Some(count) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("participant count never settled");
    }

    #[tokio::test]
    async fn offer_reaches_the_other_peer_only() {
        let relay = relay();
        let room_id = relay.create_room();
        let mut a = connect(&relay, &room_id, true);
        let mut b = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 2).await;

        a.send_text(r#"{"type":"offer"}"#);

        assert_eq!(b.recv_json().await, json!({"type": "offer"}));
        a.assert_silent().await;
    }

    #[tokio::test]
    async fn departed_peer_is_not_targeted() {
        let relay = relay();
        let room_id = relay.create_room();
        let mut a = connect(&relay, &room_id, true);
        let b = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 2).await;

        drop(b.inbound);
        let outcome = b.session.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Closed));
        wait_for_participants(&relay, &room_id, 1).await;

        a.send_text(r#"{"type":"offer"}"#);
        a.assert_silent().await;
        assert!(!a.session.is_finished());
    }

    #[tokio::test]
    async fn unknown_room_closes_with_not_found() {
        let relay = relay();
        let mut peer = connect(&relay, &RoomId::from("missing"), false);

        let outcome = peer.session.await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Errored(SessionError::Join(RelayError::RoomNotFound(_)))
        ));
        assert_eq!(
            timeout(Duration::from_millis(500), peer.outbound.next())
                .await
                .unwrap(),
            Some(Frame::Close(Some(CloseReason::room_not_found())))
        );
    }

    #[tokio::test]
    async fn malformed_payload_keeps_connection_open() {
        let relay = relay();
        let room_id = relay.create_room();
        let mut a = connect(&relay, &room_id, true);
        let mut b = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 2).await;

        a.send_text("not json");
        let notice = a.recv_json().await;
        assert_eq!(notice["type"], "error");
        assert_eq!(notice["code"], "invalid_payload");
        b.assert_silent().await;

        a.send_text(r#"{"type":"answer"}"#);
        assert_eq!(b.recv_json().await, json!({"type": "answer"}));
    }

    #[tokio::test]
    async fn binary_frames_are_rejected_with_a_notice() {
        let relay = relay();
        let room_id = relay.create_room();
        let mut a = connect(&relay, &room_id, true);
        wait_for_participants(&relay, &room_id, 1).await;

        a.inbound
            .unbounded_send(Ok(Frame::Binary(vec![1, 2, 3])))
            .unwrap();

        assert_eq!(a.recv_json().await["code"], "unsupported_frame");
    }

    #[tokio::test]
    async fn receive_error_ends_session_and_leaves_room() {
        let relay = relay();
        let room_id = relay.create_room();
        let peer = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 1).await;

        peer.inbound
            .unbounded_send(Err(ReceiveError("connection reset".to_string())))
            .unwrap();

        let outcome = peer.session.await.unwrap();
        assert_eq!(outcome.state(), SessionState::Errored);
        assert_eq!(relay.registry().participant_count(), 0);
    }

    #[tokio::test]
    async fn close_frame_ends_session() {
        let relay = relay();
        let room_id = relay.create_room();
        let mut peer = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 1).await;

        peer.inbound
            .unbounded_send(Ok(Frame::Close(None)))
            .unwrap();

        let outcome = (&mut peer.session).await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Closed));
        assert_eq!(
            peer.recv().await,
            Some(Frame::Close(Some(CloseReason::normal())))
        );
        assert_eq!(relay.registry().participant_count(), 0);
    }

    #[tokio::test]
    async fn relay_side_close_unblocks_receive() {
        let relay = relay();
        let room_id = relay.create_room();
        let peer = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 1).await;

        let participant = relay.registry().snapshot(&room_id).unwrap().participants[0].clone();
        participant.connection.close(CloseReason::delivery_failed());

        let outcome = timeout(Duration::from_secs(1), peer.session)
            .await
            .expect("session did not stop")
            .unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::ClosedByRelay(reason) if reason == CloseReason::delivery_failed()
        ));
        assert_eq!(relay.registry().participant_count(), 0);
    }

    #[tokio::test]
    async fn aborted_session_still_leaves_room() {
        let relay = relay();
        let room_id = relay.create_room();
        let mut peer = connect(&relay, &room_id, false);
        wait_for_participants(&relay, &room_id, 1).await;
        let handle = relay.registry().snapshot(&room_id).unwrap().participants[0]
            .connection
            .clone();

        peer.session.abort();
        let _ = (&mut peer.session).await;

        assert_eq!(relay.registry().participant_count(), 0);
        assert!(handle.is_closed());
        assert_eq!(handle.close_reason(), Some(CloseReason::normal()));

        // The writer outlives the aborted session just long enough to say goodbye.
        assert_eq!(
            peer.recv().await,
            Some(Frame::Close(Some(CloseReason::normal())))
        );
        let end = timeout(Duration::from_secs(1), peer.outbound.next()).await;
        assert_eq!(end, Ok(None), "writer still holds the sink");
    }
}

//! WebSocket route handlers.
//!
//! Validates the target room, upgrades the connection, and hands the socket
//! over to the relay session loop.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::relay::{run_session, Frame, ReceiveError, RoomId};
use crate::server::state::GuardedRelay;

/// Query parameters of `GET /join`.
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    #[serde(rename = "roomID")]
    pub room_id: Option<String>,
    /// Opaque role flag stored on the participant.
    #[serde(default)]
    pub host: bool,
}

/// Query parameters of `GET /v1/rooms/{room_id}/ws`.
#[derive(Debug, Deserialize)]
pub struct RoleParams {
    #[serde(default)]
    pub host: bool,
}

/// `GET /join?roomID=...&host=...`
pub async fn join_room(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(params): Query<JoinParams>,
    State(relay): State<GuardedRelay>,
) -> Response {
    let room_id = match params.room_id.filter(|id| !id.is_empty()) {
        Some(id) => RoomId::from(id),
        None => return (StatusCode::BAD_REQUEST, "Missing roomID parameter").into_response(),
    };
    upgrade(ws, relay, room_id, params.host)
}

/// `GET /v1/rooms/{room_id}/ws?host=...`
pub async fn join_room_by_path(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Path(room_id): Path<String>,
    Query(params): Query<RoleParams>,
    State(relay): State<GuardedRelay>,
) -> Response {
    upgrade(ws, relay, RoomId::from(room_id), params.host)
}

fn upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    relay: GuardedRelay,
    room_id: RoomId,
    host: bool,
) -> Response {
    // Unknown rooms are refused before the upgrade. A room evicted between
    // this check and the join is still refused, with a close frame.
    if !relay.registry().contains(&room_id) {
        debug!("Join attempt for unknown room {}", room_id);
        return (StatusCode::NOT_FOUND, "Room not found").into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    debug!("WebSocket upgrade for room {} (host: {})", room_id, host);
    ws.on_upgrade(move |socket| handle_socket(socket, relay, room_id, host))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, relay: GuardedRelay, room_id: RoomId, host: bool) {
    let (ws_sink, ws_stream) = socket.split();

    let inbound = ws_stream.map(|result| {
        result
            .map(Frame::from)
            .map_err(|e| ReceiveError(e.to_string()))
    });
    let outbound = ws_sink.with(|frame: Frame| {
        future::ready(Ok::<Message, axum::Error>(Message::from(frame)))
    });

    run_session(relay, room_id, host, inbound, outbound).await;
}

//! Room management routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{GuardedRelay, ServerState};
use super::websocket::{join_room, join_room_by_path};
use crate::relay::RoomId;

#[derive(Serialize, Debug)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
}

#[derive(Serialize, Debug)]
pub struct ParticipantInfo {
    pub connection_id: u64,
    pub host: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<ParticipantInfo>,
}

async fn create_room(State(relay): State<GuardedRelay>) -> Json<CreateRoomResponse> {
    Json(CreateRoomResponse {
        room_id: relay.create_room(),
    })
}

async fn get_room(State(relay): State<GuardedRelay>, Path(room_id): Path<String>) -> Response {
    match relay.registry().snapshot(&RoomId::from(room_id)) {
        Some(snapshot) => Json(RoomInfo {
            room_id: snapshot.room_id,
            created_at: snapshot.created_at,
            participants: snapshot
                .participants
                .iter()
                .map(|p| ParticipantInfo {
                    connection_id: p.connection_id().as_u64(),
                    host: p.host,
                    joined_at: p.joined_at,
                })
                .collect(),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "Room not found").into_response(),
    }
}

/// Routes for creating, inspecting and joining rooms.
///
/// `/create` and `/join` keep the paths existing browser clients use.
pub fn make_room_routes(state: ServerState) -> Router {
    Router::new()
        .route("/create", get(create_room).post(create_room))
        .route("/join", get(join_room))
        .route("/v1/rooms", post(create_room))
        .route("/v1/rooms/{room_id}", get(get_room))
        .route("/v1/rooms/{room_id}/ws", get(join_room_by_path))
        .with_state(state)
}

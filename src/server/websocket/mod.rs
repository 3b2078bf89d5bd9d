//! WebSocket transport for relay sessions.

mod frames;
pub mod handler;

pub use handler::{join_room, join_room_by_path};

pub mod config;
mod http_layers;
pub mod metrics;
mod rooms;
pub mod server;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use http_layers::*;
pub use rooms::{CreateRoomResponse, ParticipantInfo, RoomInfo};
pub use server::{make_app, make_metrics_app, run_server};

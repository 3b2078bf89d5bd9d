//! WebRTC signaling relay.
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod relay;
pub mod server;

// Re-export commonly used types for convenience
pub use relay::{Relay, RelaySettings, RoomId, RoomRegistry};
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};

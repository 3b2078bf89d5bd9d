//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_create_room() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let room_id = client.create_room().await;
//!     assert!(server.relay.registry().contains(&room_id.as_str().into()));
//! }
//! ```

mod client;
mod constants;
mod server;

// Public API - this is what tests import
pub use client::{connect_ws, next_json, TestClient, WsStream};
pub use constants::*;
pub use server::TestServer;

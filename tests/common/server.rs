//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own relay.

use super::constants::*;
use signaling_relay::relay::{Relay, RelaySettings, RoomId};
use signaling_relay::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Test server instance with an isolated relay
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Base URL for WebSocket connections (e.g., "ws://127.0.0.1:12345")
    pub ws_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// The relay behind the server, for direct state inspection in tests
    pub relay: Arc<Relay>,

    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with default relay settings
    pub async fn spawn() -> Self {
        Self::spawn_with(RelaySettings::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the port cannot be bound or the server does not become
    /// ready within the timeout.
    pub async fn spawn_with(settings: RelaySettings) -> Self {
        let relay = Arc::new(Relay::new(settings));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            bind_address: "127.0.0.1".to_string(),
            port,
            metrics_port: 0,
        };
        let app = make_app(config, relay.clone());

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            ws_url: format!("ws://127.0.0.1:{}", port),
            port,
            relay,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Polls until the room has exactly `expected` participants.
    ///
    /// # Panics
    ///
    /// Panics if the count is not reached within the message timeout.
    pub async fn wait_for_participants(&self, room_id: &str, expected: usize) {
        let room_id = RoomId::from(room_id);
        let start = std::time::Instant::now();
        loop {
            let count = self
                .relay
                .registry()
                .snapshot(&room_id)
                .map(|snapshot| snapshot.participants.len())
                .unwrap_or(0);
            if count == expected {
                return;
            }
            if start.elapsed() > Duration::from_millis(MESSAGE_TIMEOUT_MS) {
                panic!(
                    "Room {} has {} participants, expected {}",
                    room_id, count, expected
                );
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

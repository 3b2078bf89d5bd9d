//! HTTP and WebSocket clients for end-to-end tests
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use futures::StreamExt;
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Room Endpoints
    // ========================================================================

    /// GET /create
    pub async fn get_create(&self) -> Response {
        self.client
            .get(format!("{}/create", self.base_url))
            .send()
            .await
            .expect("Create room request failed")
    }

    /// POST /v1/rooms
    pub async fn post_room(&self) -> Response {
        self.client
            .post(format!("{}/v1/rooms", self.base_url))
            .send()
            .await
            .expect("Create room request failed")
    }

    /// GET /v1/rooms/{room_id}
    pub async fn get_room(&self, room_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/rooms/{}", self.base_url, room_id))
            .send()
            .await
            .expect("Room info request failed")
    }

    /// GET /join without upgrading
    pub async fn get_join(&self, query: &str) -> Response {
        self.client
            .get(format!("{}/join{}", self.base_url, query))
            .send()
            .await
            .expect("Join request failed")
    }

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    /// Creates a room and returns its id
    ///
    /// # Panics
    ///
    /// Panics if the server does not answer with a room id.
    pub async fn create_room(&self) -> String {
        let response = self.get_create().await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Invalid create response");
        body["room_id"]
            .as_str()
            .expect("Create response has no room_id")
            .to_string()
    }
}

/// Opens a WebSocket to `/join` on the given server.
pub async fn connect_ws(
    ws_url: &str,
    room_id: &str,
    host: bool,
) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let url = format!("{}/join?roomID={}&host={}", ws_url, room_id, host);
    let (ws_stream, _) = connect_async(url).await?;
    Ok(ws_stream)
}

/// Waits for the next text message and parses it as JSON.
///
/// Returns `None` on timeout, close, or a non-JSON message.
pub async fn next_json(ws: &mut WsStream, timeout_duration: Duration) -> Option<Value> {
    let result = timeout(timeout_duration, async {
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => return serde_json::from_str::<Value>(&text).ok(),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await;

    result.ok().flatten()
}

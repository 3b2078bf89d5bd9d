use axum::extract::FromRef;

use crate::relay::Relay;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedRelay = Arc<Relay>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub relay: GuardedRelay,
    pub version: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, relay: GuardedRelay) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            relay,
            version: format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
        }
    }
}

impl FromRef<ServerState> for GuardedRelay {
    fn from_ref(input: &ServerState) -> Self {
        input.relay.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

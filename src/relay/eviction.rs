//! Background eviction of rooms nobody uses anymore.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::registry::RoomRegistry;
use crate::server::metrics;

/// Periodically evict rooms that have been empty for at least `ttl`.
pub fn spawn(registry: Arc<RoomRegistry>, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let evicted = registry.evict_idle(ttl);
            if !evicted.is_empty() {
                info!("Evicted {} idle rooms", evicted.len());
                metrics::record_rooms_evicted(evicted.len());
            }
        }
    })
}

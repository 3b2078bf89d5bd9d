//! Signaling relay core.
//!
//! Participants join rooms over persistent connections; every payload one of
//! them sends is forwarded, untouched, to the rest of the room.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod eviction;
pub mod payload;
pub mod registry;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

pub use connection::{CloseReason, ConnectionHandle, ConnectionId, Frame};
pub use dispatcher::{Dispatcher, Envelope};
pub use error::{EncodingError, ReceiveError, RelayError, SendError};
pub use payload::{EncodedPayload, Payload};
pub use registry::{Participant, RoomId, RoomRegistry, RoomSnapshot};
pub use session::{run_session, SessionOutcome};

/// Tunables for the relay core.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    /// Payloads buffered per connection before it counts as too slow.
    pub outgoing_buffer: usize,
    /// Evict rooms left empty for this long. `None` keeps rooms forever.
    pub empty_room_ttl: Option<Duration>,
    /// How often the eviction job runs.
    pub eviction_interval: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            outgoing_buffer: 64,
            empty_room_ttl: None,
            eviction_interval: Duration::from_secs(60),
        }
    }
}

/// The relay service: room registry plus dispatcher.
///
/// Must be created inside a Tokio runtime, since it starts the dispatcher
/// (and, if configured, the eviction job).
pub struct Relay {
    registry: Arc<RoomRegistry>,
    dispatcher: Dispatcher,
    settings: RelaySettings,
    tasks: Vec<JoinHandle<()>>,
}

impl Relay {
    pub fn new(settings: RelaySettings) -> Self {
        Self::with_registry(settings, RoomRegistry::new())
    }

    pub fn with_registry(settings: RelaySettings, registry: RoomRegistry) -> Self {
        let registry = Arc::new(registry);
        let (dispatcher, dispatcher_task) = Dispatcher::spawn(registry.clone());
        let mut tasks = vec![dispatcher_task];

        if let Some(ttl) = settings.empty_room_ttl {
            info!(
                "Room eviction enabled: ttl {:?}, checking every {:?}",
                ttl, settings.eviction_interval
            );
            tasks.push(eviction::spawn(
                registry.clone(),
                ttl,
                settings.eviction_interval,
            ));
        }

        Self {
            registry,
            dispatcher,
            settings,
            tasks,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn create_room(&self) -> RoomId {
        let room_id = self.registry.create_room();
        crate::server::metrics::record_room_created();
        info!("New room created: {}", room_id);
        room_id
    }

    /// Close every joined connection. Their sessions then leave their rooms
    /// on their own.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let connections = self.registry.connections();
        for connection in &connections {
            connection.close(reason.clone());
        }
        info!("Closed {} connections ({})", connections.len(), reason.code);
        connections.len()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

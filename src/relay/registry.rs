//! Room registry.
//!
//! Maps room identifiers to the ordered list of participants currently in
//! each room. The top-level map has its own lock, write-locked only when a
//! room is created or evicted; every room carries a lock for its participant
//! list, so traffic in one room never waits on another room.
//!
//! All locks are synchronous and only ever held for a lookup, a push, a
//! removal or a snapshot copy. Nothing awaits or sends while holding one.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::connection::{ConnectionHandle, ConnectionId};
use super::error::RelayError;

/// Opaque room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Produces candidate room identifiers. Candidates may collide; the registry
/// retries until it finds a free one.
pub type RoomIdGenerator = Box<dyn Fn() -> RoomId + Send + Sync>;

fn uuid_room_id() -> RoomId {
    RoomId(uuid::Uuid::new_v4().to_string())
}

/// One connection's membership record within a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection: ConnectionHandle,
    /// Role flag given at join time. Not interpreted by the relay.
    pub host: bool,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }
}

#[derive(Default)]
struct Members {
    participants: Vec<Participant>,
    evicted: bool,
    /// Set while the room has no participants.
    empty_since: Option<Instant>,
}

struct Room {
    created_at: DateTime<Utc>,
    members: Mutex<Members>,
}

impl Room {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            members: Mutex::new(Members {
                empty_since: Some(Instant::now()),
                ..Default::default()
            }),
        }
    }

    // A panic elsewhere cannot leave `Members` half-updated: every mutation
    // is a single push/retain, so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time description of a room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

/// Registry of all live rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    generate_id: RoomIdGenerator,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Create a registry that names rooms with random UUIDs.
    pub fn new() -> Self {
        Self::with_id_generator(Box::new(uuid_room_id))
    }

    pub fn with_id_generator(generate_id: RoomIdGenerator) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            generate_id,
        }
    }

    fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned()
    }

    /// Create an empty room and return its identifier.
    pub fn create_room(&self) -> RoomId {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let candidate = (self.generate_id)();
            match rooms.entry(candidate) {
                Entry::Occupied(occupied) => {
                    warn!("Room id collision on {}, retrying", occupied.key());
                }
                Entry::Vacant(vacant) => {
                    let room_id = vacant.key().clone();
                    vacant.insert(Arc::new(Room::new()));
                    return room_id;
                }
            }
        }
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.room(room_id).is_some()
    }

    /// Append `connection` to the room's participants.
    pub fn join(
        &self,
        room_id: &RoomId,
        connection: ConnectionHandle,
        host: bool,
    ) -> Result<(), RelayError> {
        let room = self
            .room(room_id)
            .ok_or_else(|| RelayError::RoomNotFound(room_id.clone()))?;

        let mut members = room.lock();
        // Lost a race with eviction: the room is no longer reachable.
        if members.evicted {
            return Err(RelayError::RoomNotFound(room_id.clone()));
        }
        if members
            .participants
            .iter()
            .any(|p| p.connection == connection)
        {
            debug!("{} already in room {}", connection.id(), room_id);
            return Ok(());
        }
        members.participants.push(Participant {
            connection,
            host,
            joined_at: Utc::now(),
        });
        members.empty_since = None;
        Ok(())
    }

    /// Remove `connection` from the room. Returns whether it was present;
    /// leaving twice, or leaving an unknown room, is a no-op.
    pub fn leave(&self, room_id: &RoomId, connection: ConnectionId) -> bool {
        let Some(room) = self.room(room_id) else {
            return false;
        };

        let mut members = room.lock();
        let before = members.participants.len();
        members
            .participants
            .retain(|p| p.connection.id() != connection);
        let removed = members.participants.len() != before;
        if removed && members.participants.is_empty() {
            members.empty_since = Some(Instant::now());
        }
        removed
    }

    /// Snapshot of the room's participants, excluding `connection`.
    pub fn participants_except(
        &self,
        room_id: &RoomId,
        connection: ConnectionId,
    ) -> Result<Vec<Participant>, RelayError> {
        let room = self
            .room(room_id)
            .ok_or_else(|| RelayError::RoomNotFound(room_id.clone()))?;
        let members = room.lock();
        Ok(members
            .participants
            .iter()
            .filter(|p| p.connection.id() != connection)
            .cloned()
            .collect())
    }

    pub fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let room = self.room(room_id)?;
        let participants = room.lock().participants.clone();
        Some(RoomSnapshot {
            room_id: room_id.clone(),
            created_at: room.created_at,
            participants,
        })
    }

    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn participant_count(&self) -> usize {
        let rooms: Vec<Arc<Room>> = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        rooms.iter().map(|room| room.lock().participants.len()).sum()
    }

    /// Handles of every participant in every room.
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        let rooms: Vec<Arc<Room>> = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        rooms
            .iter()
            .flat_map(|room| {
                room.lock()
                    .participants
                    .iter()
                    .map(|p| p.connection.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Remove rooms that have had no participants for at least `ttl`.
    ///
    /// Each room is marked evicted under its own lock while the map is
    /// write-locked, so a concurrent `join` either lands before the check
    /// (and keeps the room alive) or sees `RoomNotFound`.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = Vec::new();

        rooms.retain(|room_id, room| {
            let mut members = room.lock();
            let idle = members
                .empty_since
                .is_some_and(|since| since.elapsed() >= ttl);
            if idle && members.participants.is_empty() {
                members.evicted = true;
                evicted.push(room_id.clone());
                false
            } else {
                true
            }
        });

        evicted
    }
}

//! Presence relay: connection registry, rooms, routing and cleanup.

pub mod connection;
pub mod lifecycle;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod stats;

pub use connection::{Connection, ConnectionContext, ConnectionId, Delivery, SendFailure};
pub use lifecycle::{CleanupReport, Lifecycle};
pub use registry::{IdentityRegistry, RegisterOutcome};
pub use rooms::{BroadcastReport, RoomKind, RoomManager};
pub use router::{DispatchTable, DropReason, RouteOutcome, Router};
pub use stats::{RelayStats, StatsSnapshot};

/// Collections shared by every connection task.
///
/// Each collection carries its own lock; nothing here is guarded globally.
#[derive(Debug)]
pub struct RelayState {
    pub registry: IdentityRegistry,
    pub file_rooms: RoomManager,
    pub group_rooms: RoomManager,
    pub stats: RelayStats,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            registry: IdentityRegistry::new(),
            file_rooms: RoomManager::new(RoomKind::File),
            group_rooms: RoomManager::new(RoomKind::Group),
            stats: RelayStats::new(),
        }
    }

    /// The room namespace for `kind`.
    pub fn rooms(&self, kind: RoomKind) -> &RoomManager {
        match kind {
            RoomKind::File => &self.file_rooms,
            RoomKind::Group => &self.group_rooms,
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

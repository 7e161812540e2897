//! Connection open/close bookkeeping.
//!
//! Closing marks the handle closed first, so concurrent broadcasts and
//! lookups stop sending to it, then removes the identity binding (only if
//! this connection still owns it) and purges the connection from both room
//! namespaces.

use super::connection::{Connection, ConnectionContext};
use super::RelayState;
use std::sync::Arc;
use tracing::info;

/// What closing a connection cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Whether the identity binding was removed.
    pub unregistered: bool,
    pub file_rooms: usize,
    pub group_rooms: usize,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: Arc<RelayState>,
}

impl Lifecycle {
    pub fn new(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    /// Start tracking a freshly accepted connection.
    pub fn open(&self, conn: Arc<Connection>) -> ConnectionContext {
        self.state.stats.connection_opened();
        info!(conn = conn.id(), remote = ?conn.remote_addr(), "connection opened");
        ConnectionContext::new(conn)
    }

    /// Tear down everything the relay holds for `ctx`.
    ///
    /// Safe to call more than once.
    pub async fn close(&self, ctx: &ConnectionContext) -> CleanupReport {
        let was_open = ctx.conn.mark_closed();

        let unregistered = match &ctx.identity {
            Some(identity) => self.state.registry.unregister(&identity.key, ctx.id()).await,
            None => false,
        };
        let file_rooms = self.state.file_rooms.remove_from_all(ctx.id()).await;
        let group_rooms = self.state.group_rooms.remove_from_all(ctx.id()).await;

        if was_open {
            self.state.stats.connection_closed();
            info!(
                conn = ctx.id(),
                identity = ctx.identity.as_ref().map(|i| i.short()).unwrap_or("-"),
                unregistered,
                file_rooms,
                group_rooms,
                "connection closed"
            );
        }

        CleanupReport {
            unregistered,
            file_rooms,
            group_rooms,
        }
    }
}

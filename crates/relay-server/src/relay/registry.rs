//! Identity registry.
//!
//! Maps each normalized identity to exactly one connection. Registration
//! follows a replace policy: the most recent `auth`/`register` for an
//! identity wins, and the connection it displaced is left open.

use super::connection::{Connection, ConnectionId};
use relay_core::{normalize, short_identity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// What a registration did to the existing mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// No previous mapping existed.
    New,
    /// The identity already pointed at this connection.
    Refreshed,
    /// The identity pointed at another connection, which was displaced.
    Replaced { previous: ConnectionId },
}

/// Registry of identities bound to live connections.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    entries: RwLock<HashMap<String, Arc<Connection>>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `conn`, replacing any previous binding.
    ///
    /// Returns `None` if the identity is blank after normalization.
    pub async fn register(
        &self,
        identity: &str,
        conn: &Arc<Connection>,
    ) -> Option<RegisterOutcome> {
        let key = normalize(identity)?;
        let mut entries = self.entries.write().await;
        let outcome = match entries.insert(key, conn.clone()) {
            None => RegisterOutcome::New,
            Some(prev) if prev.id() == conn.id() => RegisterOutcome::Refreshed,
            Some(prev) => RegisterOutcome::Replaced {
                previous: prev.id(),
            },
        };
        drop(entries);

        match outcome {
            RegisterOutcome::Replaced { previous } => info!(
                identity = %short_identity(identity),
                conn = conn.id(),
                previous,
                "identity re-registered on a new connection"
            ),
            _ => debug!(
                identity = %short_identity(identity),
                conn = conn.id(),
                "identity registered"
            ),
        }
        Some(outcome)
    }

    /// Find the open connection bound to `identity`.
    ///
    /// A mapping whose connection has closed but not yet been cleaned up is
    /// reported as absent.
    pub async fn lookup(&self, identity: &str) -> Option<Arc<Connection>> {
        let key = normalize(identity)?;
        let entries = self.entries.read().await;
        entries.get(&key).filter(|c| c.is_open()).cloned()
    }

    /// Remove the mapping for `identity` if it still points at `conn_id`.
    ///
    /// A close handler for an old connection must not evict a newer
    /// registration of the same identity. Returns whether anything was removed.
    pub async fn unregister(&self, identity: &str, conn_id: ConnectionId) -> bool {
        let Some(key) = normalize(identity) else {
            return false;
        };
        let mut entries = self.entries.write().await;
        match entries.get(&key) {
            Some(current) if current.id() == conn_id => {
                entries.remove(&key);
                debug!(identity = %short_identity(identity), conn = conn_id, "identity unregistered");
                true
            }
            Some(current) => {
                debug!(
                    identity = %short_identity(identity),
                    conn = conn_id,
                    owner = current.id(),
                    "identity owned by a newer connection, keeping it"
                );
                false
            }
            None => false,
        }
    }

    /// The connection id currently bound to `identity`, open or not.
    pub async fn owner(&self, identity: &str) -> Option<ConnectionId> {
        let key = normalize(identity)?;
        self.entries.read().await.get(&key).map(|c| c.id())
    }

    /// Number of registered identities.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// All registered identity keys.
    pub async fn identities(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

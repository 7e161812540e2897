//! Room membership.
//!
//! A [`RoomManager`] is one namespace of rooms. The relay keeps two
//! independent instances: file rooms keyed by file id and group rooms keyed
//! by group id. A room exists only while it has members.

use super::connection::{Connection, ConnectionId, Delivery};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Which namespace a room manager serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    File,
    Group,
}

impl RoomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomKind::File => "file",
            RoomKind::Group => "group",
        }
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-member results of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members whose queue accepted the frame.
    pub delivered: usize,
    /// Members that were closed or whose send failed.
    pub skipped: usize,
}

type Members = HashMap<ConnectionId, Arc<Connection>>;

/// One namespace of rooms.
#[derive(Debug)]
pub struct RoomManager {
    kind: RoomKind,
    rooms: RwLock<HashMap<String, Members>>,
}

impl RoomManager {
    pub fn new(kind: RoomKind) -> Self {
        Self {
            kind,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add `conn` to `room_id`, creating the room on first join.
    ///
    /// Returns `false` if the connection was already a member.
    pub async fn join(&self, room_id: &str, conn: &Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room_id.to_string()).or_default();
        let added = members.insert(conn.id(), conn.clone()).is_none();
        debug!(
            kind = %self.kind,
            room = %room_id,
            conn = conn.id(),
            members = members.len(),
            added,
            "room join"
        );
        added
    }

    /// Remove `conn_id` from `room_id`, deleting the room if it empties.
    ///
    /// Returns whether the connection was a member.
    pub async fn leave(&self, room_id: &str, conn_id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(&conn_id).is_some();
        if members.is_empty() {
            rooms.remove(room_id);
            debug!(kind = %self.kind, room = %room_id, "room emptied and removed");
        }
        debug!(kind = %self.kind, room = %room_id, conn = conn_id, removed, "room leave");
        removed
    }

    /// Send `frame` to every open member of `room_id` except `sender`.
    ///
    /// Returns `None` if the room does not exist. Closed members are skipped
    /// here and pruned by connection cleanup.
    pub async fn broadcast(
        &self,
        room_id: &str,
        sender: ConnectionId,
        frame: &str,
    ) -> Option<BroadcastReport> {
        let rooms = self.rooms.read().await;
        let members = rooms.get(room_id)?;

        let mut report = BroadcastReport::default();
        for (id, member) in members {
            if *id == sender {
                continue;
            }
            match member.send_text(frame) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped(reason) => {
                    trace!(kind = %self.kind, room = %room_id, conn = id, ?reason, "broadcast skipped member");
                    report.skipped += 1;
                }
            }
        }
        Some(report)
    }

    /// Remove `conn_id` from every room, deleting rooms that empty.
    ///
    /// Returns the number of rooms the connection was removed from.
    pub async fn remove_from_all(&self, conn_id: ConnectionId) -> usize {
        let mut rooms = self.rooms.write().await;
        let mut removed = 0;
        rooms.retain(|room_id, members| {
            if members.remove(&conn_id).is_some() {
                removed += 1;
                if members.is_empty() {
                    debug!(kind = %self.kind, room = %room_id, "room emptied and removed");
                    return false;
                }
            }
            true
        });
        removed
    }

    /// Connection ids in `room_id`, or `None` if the room does not exist.
    pub async fn members(&self, room_id: &str) -> Option<Vec<ConnectionId>> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|m| m.keys().copied().collect())
    }

    pub async fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    fn conn(id: ConnectionId) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        Connection::channel(id, None, 8)
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.to_text().unwrap().to_string());
        }
        out
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let rooms = RoomManager::new(RoomKind::File);
        let (a, _rx) = conn(1);

        assert!(rooms.join("f1", &a).await);
        assert!(!rooms.join("f1", &a).await);
        assert_eq!(rooms.members("f1").await, Some(vec![1]));
    }

    #[tokio::test]
    async fn leaving_last_member_deletes_room() {
        let rooms = RoomManager::new(RoomKind::Group);
        let (a, _rx1) = conn(1);
        let (b, _rx2) = conn(2);

        rooms.join("g1", &a).await;
        rooms.join("g1", &b).await;

        assert!(rooms.leave("g1", 1).await);
        assert!(rooms.contains_room("g1").await);

        assert!(rooms.leave("g1", 2).await);
        assert!(!rooms.contains_room("g1").await);
        assert_eq!(rooms.members("g1").await, None);
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn leave_unknown_room_or_member() {
        let rooms = RoomManager::new(RoomKind::Group);
        let (a, _rx) = conn(1);
        assert!(!rooms.leave("nope", 1).await);

        rooms.join("g1", &a).await;
        assert!(!rooms.leave("g1", 99).await);
        assert!(rooms.contains_room("g1").await);
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let rooms = RoomManager::new(RoomKind::File);
        let (a, mut rx_a) = conn(1);
        let (b, mut rx_b) = conn(2);
        let (c, mut rx_c) = conn(3);
        for m in [&a, &b, &c] {
            rooms.join("f1", m).await;
        }

        let report = rooms.broadcast("f1", a.id(), "chunk").await.unwrap();
        assert_eq!(report, BroadcastReport { delivered: 2, skipped: 0 });
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["chunk"]);
        assert_eq!(drain(&mut rx_c), vec!["chunk"]);
    }

    #[tokio::test]
    async fn broadcast_to_missing_room() {
        let rooms = RoomManager::new(RoomKind::File);
        assert_eq!(rooms.broadcast("ghost", 1, "x").await, None);
    }

    #[tokio::test]
    async fn broadcast_skips_closed_members_without_pruning() {
        let rooms = RoomManager::new(RoomKind::Group);
        let (a, _rx_a) = conn(1);
        let (b, rx_b) = conn(2);
        let (c, mut rx_c) = conn(3);
        for m in [&a, &b, &c] {
            rooms.join("g1", m).await;
        }
        drop(rx_b);

        let report = rooms.broadcast("g1", 1, "hello").await.unwrap();
        assert_eq!(report, BroadcastReport { delivered: 1, skipped: 1 });
        assert_eq!(drain(&mut rx_c), vec!["hello"]);
        assert_eq!(rooms.members("g1").await.map(|m| m.len()), Some(3));
    }

    #[tokio::test]
    async fn remove_from_all_cleans_every_room() {
        let rooms = RoomManager::new(RoomKind::Group);
        let (a, _rx_a) = conn(1);
        let (b, _rx_b) = conn(2);

        rooms.join("solo", &a).await;
        rooms.join("shared", &a).await;
        rooms.join("shared", &b).await;
        rooms.join("other", &b).await;

        assert_eq!(rooms.remove_from_all(1).await, 2);
        assert!(!rooms.contains_room("solo").await);
        assert_eq!(rooms.members("shared").await, Some(vec![2]));
        assert!(rooms.contains_room("other").await);

        assert_eq!(rooms.remove_from_all(1).await, 0);
    }

    #[tokio::test]
    async fn remove_from_all_with_no_rooms() {
        let rooms = RoomManager::new(RoomKind::File);
        assert_eq!(rooms.remove_from_all(42).await, 0);
    }
}

//! Routing counters.
//!
//! Every routing decision bumps one counter. The server logs a snapshot on
//! an interval; nothing here is visible to clients.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayStats {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    envelopes: AtomicU64,
    malformed: AtomicU64,
    control: AtomicU64,
    membership: AtomicU64,
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped_no_recipient: AtomicU64,
    dropped_no_room: AtomicU64,
    dropped_unclassified: AtomicU64,
    dropped_send_failed: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub envelopes: u64,
    pub malformed: u64,
    pub control: u64,
    pub membership: u64,
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped_no_recipient: u64,
    pub dropped_no_room: u64,
    pub dropped_unclassified: u64,
    pub dropped_send_failed: u64,
}

impl StatsSnapshot {
    pub fn connections_active(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        bump(&self.connections_opened, 1);
    }

    pub fn connection_closed(&self) {
        bump(&self.connections_closed, 1);
    }

    pub fn envelope(&self) {
        bump(&self.envelopes, 1);
    }

    pub fn malformed(&self) {
        bump(&self.malformed, 1);
    }

    pub fn control(&self) {
        bump(&self.control, 1);
    }

    pub fn membership(&self) {
        bump(&self.membership, 1);
    }

    /// A broadcast that reached `delivered` members.
    pub fn broadcast(&self, delivered: usize, skipped: usize) {
        bump(&self.broadcasts, 1);
        bump(&self.delivered, delivered as u64);
        bump(&self.dropped_send_failed, skipped as u64);
    }

    pub fn delivered(&self) {
        bump(&self.delivered, 1);
    }

    pub fn no_recipient(&self) {
        bump(&self.dropped_no_recipient, 1);
    }

    pub fn no_room(&self) {
        bump(&self.dropped_no_room, 1);
    }

    pub fn unclassified(&self) {
        bump(&self.dropped_unclassified, 1);
    }

    pub fn send_failed(&self) {
        bump(&self.dropped_send_failed, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            connections_opened: load(&self.connections_opened),
            connections_closed: load(&self.connections_closed),
            envelopes: load(&self.envelopes),
            malformed: load(&self.malformed),
            control: load(&self.control),
            membership: load(&self.membership),
            broadcasts: load(&self.broadcasts),
            delivered: load(&self.delivered),
            dropped_no_recipient: load(&self.dropped_no_recipient),
            dropped_no_room: load(&self.dropped_no_room),
            dropped_unclassified: load(&self.dropped_unclassified),
            dropped_send_failed: load(&self.dropped_send_failed),
        }
    }
}

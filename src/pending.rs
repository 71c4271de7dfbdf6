//! Bounded pool of per-peer pending notifications.
//!
//! A peer gets a [PeerNotificationRecord] when a bound cluster changes while no session to it is open.
//! The record collects the changed (endpoint, cluster) paths until the session resolves.
//! - at most one record per peer
//! - at most one entry per (endpoint, cluster) inside a record, a repeated change only replaces the context
//! - a full record overwrites its oldest entry; the displaced context is dropped without release
//! - a full pool evicts the least recently updated record and hands it back so its contexts can be released

use std::time::Instant;

use crate::{
    clock::{Clock, SystemClock},
    error::{BindingError, Result},
    ring::OverwriteRing,
    types::{ClusterId, EndpointId, FabricIndex, PeerId},
};

/// Default number of distinct cluster paths queued per peer.
pub const MAX_PENDING_NOTIFICATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
}

impl ClusterPath {
    pub fn new(endpoint: EndpointId, cluster: ClusterId) -> Self {
        Self { endpoint, cluster }
    }
}

#[derive(Debug)]
pub struct PendingNotification<C> {
    pub path: ClusterPath,
    pub context: C,
}

#[derive(Debug)]
pub struct PeerNotificationRecord<C> {
    peer: PeerId,
    last_update: Instant,
    connect_attempt: u64,
    notifications: OverwriteRing<PendingNotification<C>>,
}

impl<C> PeerNotificationRecord<C> {
    fn new(peer: PeerId, now: Instant, connect_attempt: u64, capacity: usize) -> Self {
        Self {
            peer,
            last_update: now,
            connect_attempt,
            notifications: OverwriteRing::new(capacity),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn last_update_time(&self) -> Instant {
        self.last_update
    }

    /// Id of the session request issued when this record was created.
    pub fn connect_attempt(&self) -> u64 {
        self.connect_attempt
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingNotification<C>> {
        self.notifications.iter()
    }

    pub fn paths(&self) -> Vec<ClusterPath> {
        self.notifications.iter().map(|n| n.path).collect()
    }

    /// Consume the record, yielding its notifications in insertion order.
    pub fn into_notifications(self) -> impl Iterator<Item = PendingNotification<C>> {
        self.notifications.into_iter()
    }

    fn touch(&mut self, now: Instant) {
        self.last_update = now;
    }

    fn add(&mut self, path: ClusterPath, context: C) {
        if let Some(existing) = self.notifications.iter_mut().find(|n| n.path == path) {
            existing.context = context;
            return;
        }
        if let Some(displaced) = self
            .notifications
            .push_overwrite_oldest(PendingNotification { path, context })
        {
            log::debug!(
                "pending list of {} full; overwrote endpoint:{} cluster:{:#x}",
                self.peer,
                displaced.path.endpoint,
                displaced.path.cluster
            );
        }
    }
}

/// Result of [PendingNotificationMap::add_pending_notification].
#[derive(Debug)]
pub struct Enqueued<C> {
    /// A new record was allocated for the peer (no session request in flight yet).
    pub created: bool,
    /// Record evicted to make room for the new one.
    pub evicted: Option<PeerNotificationRecord<C>>,
}

pub struct PendingNotificationMap<C> {
    records: Vec<PeerNotificationRecord<C>>,
    capacity: usize,
    per_peer_capacity: usize,
    clock: Box<dyn Clock>,
}

impl<C> PendingNotificationMap<C> {
    pub fn new(capacity: usize, per_peer_capacity: usize) -> Self {
        Self::with_clock(capacity, per_peer_capacity, Box::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, per_peer_capacity: usize, clock: Box<dyn Clock>) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            per_peer_capacity,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.records.iter().any(|r| r.peer == peer)
    }

    pub fn get(&self, peer: PeerId) -> Option<&PeerNotificationRecord<C>> {
        self.records.iter().find(|r| r.peer == peer)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.records.iter().map(|r| r.peer).collect()
    }

    /// Queue `context` for `path` on `peer`, allocating a record when the peer has none.
    /// `connect_attempt` is stored only when a record is allocated.
    pub fn add_pending_notification(
        &mut self,
        peer: PeerId,
        path: ClusterPath,
        context: C,
        connect_attempt: u64,
    ) -> Result<Enqueued<C>> {
        let now = self.clock.now();
        if let Some(record) = self.records.iter_mut().find(|r| r.peer == peer) {
            record.add(path, context);
            record.touch(now);
            return Ok(Enqueued {
                created: false,
                evicted: None,
            });
        }

        if self.capacity == 0 {
            return Err(BindingError::NoMemory("pending notification pool"));
        }
        if self.per_peer_capacity == 0 {
            return Err(BindingError::NoMemory("pending notification list"));
        }

        let evicted = if self.records.len() >= self.capacity {
            let lru = self.find_lru_index().ok_or(BindingError::NoMemory("pending notification pool"))?;
            let evicted = self.records.remove(lru);
            log::debug!(
                "pending pool full; evicting {} with {} notifications",
                evicted.peer,
                evicted.len()
            );
            Some(evicted)
        } else {
            None
        };

        let mut record = PeerNotificationRecord::new(peer, now, connect_attempt, self.per_peer_capacity);
        record.add(path, context);
        self.records.push(record);
        Ok(Enqueued {
            created: true,
            evicted,
        })
    }

    /// Remove and return the record of `peer`.
    pub fn take(&mut self, peer: PeerId) -> Option<PeerNotificationRecord<C>> {
        let pos = self.records.iter().position(|r| r.peer == peer)?;
        Some(self.records.remove(pos))
    }

    /// Remove every record, oldest allocation first.
    pub fn take_all(&mut self) -> Vec<PeerNotificationRecord<C>> {
        std::mem::take(&mut self.records)
    }

    pub fn remove_all_for_fabric(&mut self, fabric_index: FabricIndex) -> Vec<PeerNotificationRecord<C>> {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.records.len() {
            if self.records[i].peer.fabric_index == fabric_index {
                removed.push(self.records.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Index of the record with the oldest update time; ties go to the earliest allocated.
    fn find_lru_index(&self) -> Option<usize> {
        let mut lru: Option<(usize, Instant)> = None;
        for (i, r) in self.records.iter().enumerate() {
            match lru {
                Some((_, t)) if r.last_update >= t => {}
                _ => lru = Some((i, r.last_update)),
            }
        }
        lru.map(|(i, _)| i)
    }
}

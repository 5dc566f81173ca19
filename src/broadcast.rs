//! Room-scoped fan-out to N-1 peers.
//!
//! Uses tokio broadcast channels for O(1) publish to all subscribers.
//! Each channel joined to a room gets an independent receiver buffering
//! up to `capacity` frames; a slow or dead peer only loses its own
//! backlog (`Lagged`) and never blocks delivery to the others.
//!
//! Ordering: frames from a single sender reach every peer in the order
//! the sender published them. No ordering is guaranteed across senders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Identity of one transport channel within a room.
///
/// Distinct from the username: the same user could hold two channels,
/// and exclusion of the sender works per channel, not per user.
pub type ChannelId = Uuid;

/// An encoded frame tagged with the channel that published it.
type Frame = (ChannelId, Arc<String>);

/// Statistics for monitoring a room's broadcast health.
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub frames_published: u64,
    pub active_channels: usize,
}

/// Atomic counters so publish never takes a lock.
struct AtomicRoomStats {
    frames_published: AtomicU64,
}

/// A receiver bound to one channel's membership in a room.
///
/// `recv` transparently skips frames the owning channel published
/// itself, so a message from A is never delivered back to A.
pub struct RoomReceiver {
    id: ChannelId,
    rx: broadcast::Receiver<Frame>,
}

impl RoomReceiver {
    /// Receive the next frame published by some *other* channel.
    pub async fn recv(&mut self) -> Result<Arc<String>, broadcast::error::RecvError> {
        loop {
            let (sender, payload) = self.rx.recv().await?;
            if sender != self.id {
                return Ok(payload);
            }
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }
}

/// The set of transport channels collaborating on one document.
pub struct Room {
    sender: broadcast::Sender<Frame>,
    /// Connected channels: id → username (for logging and rosters).
    members: Arc<RwLock<HashMap<ChannelId, String>>>,
    capacity: usize,
    stats: Arc<AtomicRoomStats>,
}

impl Room {
    /// Create a room buffering up to `capacity` frames per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicRoomStats { frames_published: AtomicU64::new(0) }),
        }
    }

    /// Add a channel to the room; returns its id and a receiver.
    pub async fn join(&self, username: impl Into<String>) -> (ChannelId, RoomReceiver) {
        let id = Uuid::new_v4();
        self.members.write().await.insert(id, username.into());
        let rx = RoomReceiver { id, rx: self.sender.subscribe() };
        (id, rx)
    }

    /// Add a channel only if the room holds fewer than `max_members`.
    ///
    /// The count check and the insert happen under one write lock, so
    /// concurrent joins can never overshoot the cap.
    pub async fn try_join(
        &self,
        username: impl Into<String>,
        max_members: usize,
    ) -> Option<(ChannelId, RoomReceiver)> {
        let mut members = self.members.write().await;
        if members.len() >= max_members {
            return None;
        }
        let id = Uuid::new_v4();
        members.insert(id, username.into());
        let rx = RoomReceiver { id, rx: self.sender.subscribe() };
        Some((id, rx))
    }

    /// Remove a channel; returns its username if it was a member.
    pub async fn leave(&self, id: &ChannelId) -> Option<String> {
        self.members.write().await.remove(id)
    }

    /// Update the recorded username for a channel (learned from its
    /// first event carrying one).
    pub async fn set_member_name(&self, id: &ChannelId, username: impl Into<String>) {
        if let Some(name) = self.members.write().await.get_mut(id) {
            *name = username.into();
        }
    }

    /// Fan a frame out to every other channel in the room.
    ///
    /// Fire-and-forget: returns immediately with the number of live
    /// receivers (the sender's own included — it filters in
    /// [`RoomReceiver::recv`]). No lock on the hot path.
    pub fn publish(&self, sender: ChannelId, frame: Arc<String>) -> usize {
        let count = self.sender.send((sender, frame)).unwrap_or(0);
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn members(&self) -> Vec<String> {
        self.members.read().await.values().cloned().collect()
    }

    pub async fn has_member(&self, id: &ChannelId) -> bool {
        self.members.read().await.contains_key(id)
    }

    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            active_channels: self.members.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps room ids (document identity) to live rooms.
///
/// Rooms are created on first join and removed once empty — no room
/// state survives its last channel. A reopened room starts with empty
/// presence; document content is reloaded from persistence, never
/// rebuilt from unacknowledged transient edits.
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
        }
    }

    /// Get or create the room for a document.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        // Slow path: write lock, double-checked
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(Room::new(self.default_capacity));
        rooms.insert(room_id.to_string(), room.clone());
        room
    }

    /// Remove a room once its last channel has left.
    pub async fn remove_if_empty(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            if room.member_count().await == 0 {
                rooms.remove(room_id);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_rooms(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

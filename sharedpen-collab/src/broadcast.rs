//! Fan-out of encoded server frames to every connection in a room.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each peer gets an independent receiver that buffers up to `capacity`
//! frames; addressing (one client, everyone but the sender) is resolved on
//! the receiving side by [`Frame::recipient`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::server::Recipient;

/// One encoded server message and who it is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub recipient: Recipient,
    pub payload: String,
}

/// A connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    pub name: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            peer_id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Counters shared with receivers, which report frames lost to lagging.
#[derive(Debug, Default)]
pub(crate) struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    pub(crate) fn record_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }
}

/// The broadcast channel for a single document room.
#[derive(Debug)]
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Frame>>,
    peers: Arc<RwLock<HashMap<Uuid, PeerInfo>>>,
    stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    /// `capacity` frames are buffered per peer; a peer further behind than
    /// that lags (see [`RoomConnection`](crate::RoomConnection)).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(AtomicBroadcastStats::default()),
        }
    }

    /// Add a peer; frames sent from now on reach the returned receiver.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Frame>> {
        let mut peers = self.peers.write().await;
        peers.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        let mut peers = self.peers.write().await;
        peers.remove(peer_id)
    }

    /// Send a frame to every receiver. Returns how many receivers there are;
    /// filtering by recipient is the receiver's job.
    pub fn broadcast(&self, frame: Frame) -> usize {
        let count = self.sender.send(Arc::new(frame)).unwrap_or(0);
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn stats(&self) -> BroadcastStats {
        let peers = self.peers.read().await;
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: peers.len(),
        }
    }

    pub(crate) fn stats_handle(&self) -> Arc<AtomicBroadcastStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(recipient: Recipient, payload: &str) -> Frame {
        Frame {
            recipient,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_group_add_remove() {
        let group = BroadcastGroup::new(16);
        let peer = PeerInfo::new("Alice");
        let peer_id = peer.peer_id;

        let _rx = group.add_peer(peer).await;
        assert_eq!(group.peer_count().await, 1);

        assert_eq!(group.remove_peer(&peer_id).await.unwrap().name, "Alice");
        assert_eq!(group.peer_count().await, 0);
        assert!(group.remove_peer(&peer_id).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let group = BroadcastGroup::new(16);
        let mut rx1 = group.add_peer(PeerInfo::new("Alice")).await;
        let mut rx2 = group.add_peer(PeerInfo::new("Bob")).await;
        let mut rx3 = group.add_peer(PeerInfo::new("Charlie")).await;

        let count = group.broadcast(frame(Recipient::All, "hello"));
        assert_eq!(count, 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert_eq!(rx.recv().await.unwrap().payload, "hello");
        }
    }

    #[tokio::test]
    async fn test_broadcast_without_peers() {
        let group = BroadcastGroup::new(4);
        assert_eq!(group.broadcast(frame(Recipient::All, "x")), 0);
        assert_eq!(group.stats().await.messages_sent, 1);
    }

    #[tokio::test]
    async fn test_broadcast_stats() {
        let group = BroadcastGroup::new(16);
        let _rx = group.add_peer(PeerInfo::new("Alice")).await;

        group.broadcast(frame(Recipient::All, "a"));
        group.broadcast(frame(Recipient::Client("x".into()), "b"));
        group.stats_handle().record_dropped(3);

        let stats = group.stats().await;
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_dropped, 3);
        assert_eq!(stats.active_peers, 1);
    }

    #[tokio::test]
    async fn test_lagging_receiver() {
        let group = BroadcastGroup::new(2);
        let mut rx = group.add_peer(PeerInfo::new("Slow")).await;
        for i in 0..4 {
            group.broadcast(frame(Recipient::All, &i.to_string()));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().payload, "2");
    }
}

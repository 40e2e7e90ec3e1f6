//! Fan-out of canonical text frames to every connected editor.
//!
//! Uses a tokio broadcast channel for O(1) send to all subscribers. Each
//! peer gets an independent receiver that buffers up to `capacity` frames;
//! a peer that falls further behind skips to the newest frames. Since every
//! frame carries the full canonical text, skipping is harmless.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// One encoded frame and the peer whose update produced it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub origin: Uuid,
    pub payload: Arc<str>,
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub frames_lagged: u64,
    pub active_peers: usize,
}

/// Counters updated with atomics so broadcasting never takes a lock.
struct AtomicBroadcastStats {
    frames_sent: AtomicU64,
    frames_lagged: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_lagged: AtomicU64::new(0),
        }
    }
}

/// The set of peers editing the shared buffer.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Frame>,

    /// Connected peers
    peers: Arc<RwLock<HashSet<Uuid>>>,

    /// Frames buffered per receiver
    capacity: usize,

    atomic_stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashSet::new())),
            capacity,
            atomic_stats: Arc::new(AtomicBroadcastStats::new()),
        }
    }

    /// Register a peer and return its receiver.
    pub async fn add_peer(&self, peer_id: Uuid) -> broadcast::Receiver<Frame> {
        let mut peers = self.peers.write().await;
        peers.insert(peer_id);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.write().await.remove(peer_id)
    }

    /// Send a frame to every receiver, the origin's included; filtering is
    /// the receiver's job. Returns the number of receivers reached.
    pub fn broadcast(&self, origin: Uuid, payload: impl Into<Arc<str>>) -> usize {
        let frame = Frame {
            origin,
            payload: payload.into(),
        };
        let count = self.sender.send(frame).unwrap_or(0);
        self.atomic_stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record frames a lagging receiver skipped.
    pub fn record_lag(&self, skipped: u64) {
        self.atomic_stats
            .frames_lagged
            .fetch_add(skipped, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains(peer_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        let peers = self.peers.read().await;
        BroadcastStats {
            frames_sent: self.atomic_stats.frames_sent.load(Ordering::Relaxed),
            frames_lagged: self.atomic_stats.frames_lagged.load(Ordering::Relaxed),
            active_peers: peers.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Registry of connected peers, keyed by 8-bit peer identifier; targeted and
//! broadcast sends.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::tcp_peer::TcpPeer;

/// Outcome of a `broadcast`: which peers accepted the frame and which didn't.
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    pub successes: Vec<u8>,
    pub failures: Vec<(u8, String)>,
}

impl BroadcastResult {
    pub fn any_success(&self) -> bool {
        !self.successes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PeerManager {
    peers: RwLock<HashMap<u8, Arc<TcpPeer>>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `peer` under `peer_id`, overwriting any prior registration.
    pub async fn register(&self, peer_id: u8, peer: Arc<TcpPeer>) {
        let mut peers = self.peers.write().await;
        if peers.insert(peer_id, peer).is_some() {
            warn!(peer_id, "overwriting existing peer registration");
        }
    }

    /// Disconnects and removes the peer, if present. Idempotent.
    pub async fn unregister(&self, peer_id: u8) {
        let peer = self.peers.write().await.remove(&peer_id);
        if let Some(peer) = peer {
            peer.stop_read_loop().await;
        }
    }

    /// Looks up `peer_id` and sends `data`. Returns `false` if the peer is
    /// unknown or disconnected; never retries.
    pub async fn send_to(&self, peer_id: u8, data: &[u8], total_size: u64) -> bool {
        let peer = self.peers.read().await.get(&peer_id).cloned();
        match peer {
            Some(peer) => peer.send(data, total_size).await.is_ok(),
            None => false,
        }
    }

    /// For each registered peer, builds a fresh reader via `producer()` and
    /// attempts `send`, collecting successes and failures. Never fails as a
    /// whole.
    pub async fn broadcast<F>(&self, producer: F, total_size: u64) -> BroadcastResult
    where
        F: Fn() -> Vec<u8>,
    {
        let snapshot: Vec<(u8, Arc<TcpPeer>)> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(id, peer)| (*id, Arc::clone(peer)))
            .collect();

        let mut result = BroadcastResult::default();
        for (peer_id, peer) in snapshot {
            let data = producer();
            match peer.send(&data, total_size).await {
                Ok(()) => result.successes.push(peer_id),
                Err(e) => result.failures.push((peer_id, e.to_string())),
            }
        }
        result
    }

    pub async fn contains(&self, peer_id: u8) -> bool {
        self.peers.read().await.contains_key(&peer_id)
    }

    pub async fn is_connected(&self, peer_id: u8) -> bool {
        match self.peers.read().await.get(&peer_id) {
            Some(peer) => peer.is_connected().await,
            None => false,
        }
    }

    pub async fn size(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Unregisters every peer, joining each read loop.
    pub async fn shutdown(&self) {
        let ids: Vec<u8> = self.peers.read().await.keys().copied().collect();
        for peer_id in ids {
            self.unregister(peer_id).await;
        }
    }
}

//! Composition root: wires Store, Codec, Channel, PeerManager, and FileServer
//! together, runs the accept loop and the dispatcher, and drives the
//! handshake for both accepted and dialed connections.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::channel::Channel;
use crate::codec::{Codec, MessageFrame};
use crate::config::NodeConfig;
use crate::error::{DfsError, DfsResult};
use crate::file_server::{FileServer, FrameSource, PeerSink};
use crate::peer_manager::{BroadcastResult, PeerManager};
use crate::store::Store;
use crate::tcp_peer::TcpPeer;

#[async_trait]
impl PeerSink for PeerManager {
    async fn send_to(&self, peer_id: u8, data: &[u8], total_size: u64) -> bool {
        PeerManager::send_to(self, peer_id, data, total_size).await
    }

    async fn broadcast(&self, data: Vec<u8>, total_size: u64) -> BroadcastResult {
        PeerManager::broadcast(self, || data.clone(), total_size).await
    }
}

#[async_trait]
impl FrameSource for Channel {
    async fn recv(&self) -> MessageFrame {
        Channel::recv(self).await
    }
}

/// Owns the listening socket, the peer registry, the dispatcher, and every
/// component they depend on. The single entry point a binary needs.
pub struct Bootstrap {
    config: NodeConfig,
    codec: Codec,
    peer_manager: Arc<PeerManager>,
    channel: Arc<Channel>,
    file_server: Arc<FileServer<PeerManager, Channel>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Bootstrap {
    pub fn new(config: NodeConfig, key: [u8; crate::crypto_stream::KEY_SIZE]) -> Self {
        let store = Store::new(config.node_storage_dir());
        let codec = Codec::new(key);
        let peer_manager = Arc::new(PeerManager::new());
        let channel = Arc::new(Channel::new());
        let file_server = FileServer::new(
            config.node_id as u32,
            store,
            codec.clone(),
            Arc::clone(&peer_manager),
            Arc::clone(&channel),
        );

        Self {
            config,
            codec,
            peer_manager,
            channel,
            file_server,
            accept_task: Mutex::new(None),
            dispatch_task: Mutex::new(None),
        }
    }

    pub fn file_server(&self) -> Arc<FileServer<PeerManager, Channel>> {
        Arc::clone(&self.file_server)
    }

    /// Dials every configured bootstrap peer, performing the handshake and
    /// registering each one that succeeds. Returns `true` iff every peer in
    /// the list connected.
    pub async fn connect_to_bootstrap_nodes(&self) -> bool {
        let mut all_connected = true;

        for node in &self.config.bootstrap_peers {
            let Some((host, port)) = node.rsplit_once(':') else {
                error!(node = %node, "invalid bootstrap node format, expected host:port");
                all_connected = false;
                continue;
            };

            match self.connect_to(host, port).await {
                Ok(()) => info!(node = %node, "connected to bootstrap peer"),
                Err(e) => {
                    error!(node = %node, error = %e, "failed to connect to bootstrap peer");
                    all_connected = false;
                }
            }
        }

        all_connected
    }

    async fn connect_to(&self, host: &str, port: &str) -> DfsResult<()> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| DfsError::Network(e.to_string()))?;
        self.complete_handshake(stream).await
    }

    /// Performs the 1-byte identifier exchange, registers the peer, and
    /// starts its read loop feeding frames through this node's Codec and
    /// Channel. A frame that exceeds the payload size cap disconnects the
    /// peer outright rather than just being dropped, since a peer sending
    /// one is either broken or misbehaving.
    async fn complete_handshake(&self, mut stream: TcpStream) -> DfsResult<()> {
        stream
            .write_all(&[self.config.node_id])
            .await
            .map_err(|e| DfsError::Network(e.to_string()))?;

        let mut remote_id = [0u8; 1];
        stream
            .read_exact(&mut remote_id)
            .await
            .map_err(|e| DfsError::Network(e.to_string()))?;
        let remote_id = remote_id[0];

        let peer = TcpPeer::new(stream);
        // Register before the read loop starts so a FrameTooLarge on the very
        // first frame still finds this peer in the registry to disconnect.
        self.peer_manager.register(remote_id, Arc::clone(&peer)).await;

        let codec = self.codec.clone();
        let channel = Arc::clone(&self.channel);
        let peer_manager = Arc::clone(&self.peer_manager);
        peer.start_read_loop(move |body| {
            let codec = codec.clone();
            let channel = Arc::clone(&channel);
            let peer_manager = Arc::clone(&peer_manager);
            async move {
                let mut cursor = body.as_slice();
                match codec.deserialize(&mut cursor, &channel).await {
                    Ok(_) => {}
                    Err(DfsError::FrameTooLarge { size, limit }) => {
                        warn!(peer_id = remote_id, size, limit, "peer sent an oversized frame, disconnecting");
                        // unregister joins this very read loop's task; spawn it
                        // detached so the processor call returns and the loop
                        // can observe its own stop signal instead of deadlocking.
                        tokio::spawn(async move {
                            peer_manager.unregister(remote_id).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping malformed or undecryptable frame");
                    }
                }
            }
        })
        .await;

        Ok(())
    }

    /// Binds the listening socket and spawns the accept loop and the
    /// dispatcher as background tasks, then returns. Both keep running until
    /// `shutdown` is called.
    pub async fn start(self: &Arc<Self>) -> DfsResult<()> {
        let listener = TcpListener::bind((self.config.listen_address.as_str(), self.config.listen_port))
            .await
            .map_err(|e| DfsError::Network(e.to_string()))?;
        info!(
            address = %self.config.listen_address,
            port = self.config.listen_port,
            "listening for peers"
        );

        if !self.config.bootstrap_peers.is_empty() && !self.connect_to_bootstrap_nodes().await {
            warn!("failed to connect to some bootstrap nodes, continuing anyway");
        }

        let dispatcher = {
            let file_server = self.file_server();
            tokio::spawn(async move { file_server.run().await })
        };
        *self.dispatch_task.lock().await = Some(dispatcher);

        let this = Arc::clone(self);
        let accept_loop = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = this.complete_handshake(stream).await {
                            warn!(peer = %addr, error = %e, "handshake failed");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        });
        *self.accept_task.lock().await = Some(accept_loop);

        Ok(())
    }

    /// Stops accepting new connections, stops the dispatcher, and unregisters
    /// every peer (joining its read task). The accept loop blocks on a socket
    /// read with no way to observe a flag, so it is aborted directly rather
    /// than asked to exit.
    pub async fn shutdown(&self) {
        info!("shutting down");

        if let Some(task) = self.accept_task.lock().await.take() {
            task.abort();
        }

        self.file_server.shutdown();
        if let Some(task) = self.dispatch_task.lock().await.take() {
            let _ = task.await;
        }

        self.peer_manager.shutdown().await;
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; crate::crypto_stream::KEY_SIZE] {
        [0x55u8; crate::crypto_stream::KEY_SIZE]
    }

    #[tokio::test]
    async fn two_nodes_handshake_and_replicate_a_file() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let mut config_a = NodeConfig::default();
        config_a.node_id = 1;
        config_a.listen_address = "127.0.0.1".to_string();
        config_a.listen_port = 0;
        config_a.storage_root = dir_a.path().to_path_buf();

        let listener_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr_a = listener_a.local_addr().unwrap();
        drop(listener_a);
        config_a.listen_port = addr_a.port();

        let mut config_b = NodeConfig::default();
        config_b.node_id = 2;
        config_b.listen_address = "127.0.0.1".to_string();
        config_b.listen_port = 0;
        config_b.storage_root = dir_b.path().to_path_buf();
        config_b.bootstrap_peers = vec![format!("127.0.0.1:{}", addr_a.port())];

        let bootstrap_a = Arc::new(Bootstrap::new(config_a, test_key()));
        let bootstrap_b = Arc::new(Bootstrap::new(config_b, test_key()));

        let a = Arc::clone(&bootstrap_a);
        tokio::spawn(async move { a.start().await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let b = Arc::clone(&bootstrap_b);
        tokio::spawn(async move { b.start().await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(bootstrap_a.peer_manager.size().await, 1);
        assert_eq!(bootstrap_b.peer_manager.size().await, 1);

        let ok = bootstrap_b
            .file_server()
            .store_file("shared.txt", b"replicated bytes")
            .await
            .unwrap();
        assert!(ok);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let fetched = bootstrap_a.file_server().get_file("shared.txt").await.unwrap();
        assert_eq!(fetched, Some(b"replicated bytes".to_vec()));

        bootstrap_a.shutdown().await;
        bootstrap_b.shutdown().await;
    }

    #[tokio::test]
    async fn oversized_frame_disconnects_the_sending_peer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.node_id = 1;
        config.listen_address = "127.0.0.1".to_string();
        config.listen_port = 0;
        config.storage_root = dir.path().to_path_buf();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        config.listen_port = addr.port();

        let bootstrap = Arc::new(Bootstrap::new(config, test_key()));
        let node = Arc::clone(&bootstrap);
        tokio::spawn(async move { node.start().await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[9u8]).await.unwrap();
        let mut their_id = [0u8; 1];
        stream.read_exact(&mut their_id).await.unwrap();

        let mut bogus_header = [0u8; crate::codec::HEADER_SIZE];
        bogus_header[25..33].copy_from_slice(&(crate::codec::MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        stream
            .write_all(&(bogus_header.len() as u32).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&bogus_header).await.unwrap();

        let mut disconnected = false;
        for _ in 0..20 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if bootstrap.peer_manager.size().await == 0 {
                disconnected = true;
                break;
            }
        }
        assert!(disconnected, "peer sending an oversized frame was not disconnected");

        bootstrap.shutdown().await;
    }
}

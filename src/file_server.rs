//! Top-level orchestrator: local store/get API for callers, dispatch of inbound
//! frames popped off the Channel.
//!
//! `FileServer` depends on two narrow traits rather than the concrete
//! `PeerManager`/`Channel` types, so tests can substitute in-memory fakes without
//! standing up real sockets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::{debug, warn};

use crate::codec::{Codec, MessageFrame, MessageType};
use crate::error::DfsResult;
use crate::peer_manager::BroadcastResult;
use crate::store::Store;

/// Bound on `get_file`'s wait for a remote STORE_FILE reply.
const GET_FILE_TIMEOUT: Duration = Duration::from_secs(2);

/// The subset of `PeerManager` the dispatcher needs: targeted and broadcast send.
#[async_trait]
pub trait PeerSink: Send + Sync {
    async fn send_to(&self, peer_id: u8, data: &[u8], total_size: u64) -> bool;
    async fn broadcast(&self, data: Vec<u8>, total_size: u64) -> BroadcastResult;
}

/// The subset of `Channel` the dispatcher needs: blocking receive.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn recv(&self) -> MessageFrame;
}

/// A `get_file` call waiting on a STORE_FILE reply for a given filename.
type Waiter = (u64, oneshot::Sender<Vec<u8>>);

pub struct FileServer<P: PeerSink, F: FrameSource> {
    node_id: u32,
    store: Store,
    codec: Codec,
    peers: Arc<P>,
    frames: Arc<F>,
    shutting_down: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    pending: Mutex<HashMap<String, Vec<Waiter>>>,
    next_request_id: AtomicU64,
}

impl<P: PeerSink + 'static, F: FrameSource + 'static> FileServer<P, F> {
    pub fn new(node_id: u32, store: Store, codec: Codec, peers: Arc<P>, frames: Arc<F>) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            store,
            codec,
            peers,
            frames,
            shutting_down: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(0),
        })
    }

    /// Writes `contents` into the local store under `filename`, then broadcasts
    /// a STORE_FILE frame. Returns true iff the local write succeeded and the
    /// broadcast reached at least one peer (or there were none to reach).
    pub async fn store_file(&self, filename: &str, contents: &[u8]) -> DfsResult<bool> {
        self.store.store(filename, contents).await?;

        let mut plaintext = Vec::with_capacity(filename.len() + contents.len());
        plaintext.extend_from_slice(filename.as_bytes());
        plaintext.extend_from_slice(contents);

        let mut wire = Vec::new();
        let total = self
            .codec
            .serialize(
                &mut wire,
                MessageType::StoreFile,
                self.node_id,
                filename.len() as u32,
                &plaintext,
            )
            .await?;

        let result = self.peers.broadcast(wire, total).await;
        Ok(result.any_success() || result.successes.is_empty() && result.failures.is_empty())
    }

    /// Returns the file's bytes: from the local store if present, otherwise by
    /// requesting it from every peer and waiting up to 2 s for a reply.
    ///
    /// Registers a one-shot waiter under `filename` rather than reading frames
    /// itself — `run`'s dispatch loop is the only caller of `frames.recv()`, and
    /// fulfills this waiter when a matching STORE_FILE frame comes through.
    pub async fn get_file(&self, filename: &str) -> DfsResult<Option<Vec<u8>>> {
        if self.store.has(filename).await {
            let mut out = Vec::new();
            self.store.get(filename, &mut out).await?;
            return Ok(Some(out));
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .entry(filename.to_string())
            .or_default()
            .push((request_id, tx));

        let mut wire = Vec::new();
        let total = self
            .codec
            .serialize(
                &mut wire,
                MessageType::GetFile,
                self.node_id,
                filename.len() as u32,
                filename.as_bytes(),
            )
            .await?;
        self.peers.broadcast(wire, total).await;

        let result = tokio::time::timeout(GET_FILE_TIMEOUT, rx).await;
        self.clear_pending(filename, request_id).await;

        match result {
            Ok(Ok(contents)) => Ok(Some(contents)),
            Ok(Err(_)) | Err(_) => Ok(None),
        }
    }

    /// Removes a single waiter by request id, dropping the filename's entry
    /// entirely once its last waiter is gone.
    async fn clear_pending(&self, filename: &str, request_id: u64) {
        let mut pending = self.pending.lock().await;
        if let Some(waiters) = pending.get_mut(filename) {
            waiters.retain(|(id, _)| *id != request_id);
            if waiters.is_empty() {
                pending.remove(filename);
            }
        }
    }

    /// Hands `contents` to every `get_file` call currently waiting on `filename`.
    async fn notify_pending(&self, filename: &str, contents: &[u8]) {
        if let Some(waiters) = self.pending.lock().await.remove(filename) {
            for (_, tx) in waiters {
                let _ = tx.send(contents.to_vec());
            }
        }
    }

    /// Applies one inbound frame's effect: writes a STORE_FILE into the local
    /// store (never re-broadcasting it), or answers a GET_FILE from the local
    /// store if present.
    pub async fn dispatch(&self, frame: MessageFrame) -> DfsResult<()> {
        match frame.message_type {
            MessageType::StoreFile => {
                let filename = String::from_utf8_lossy(frame.filename()).into_owned();
                self.store.store(&filename, frame.contents()).await?;
                debug!(filename = %filename, source_id = frame.source_id, "stored file from peer");
                self.notify_pending(&filename, frame.contents()).await;
            }
            MessageType::GetFile => {
                let filename = String::from_utf8_lossy(frame.filename()).into_owned();
                if !self.store.has(&filename).await {
                    return Ok(());
                }

                let mut contents = Vec::new();
                self.store.get(&filename, &mut contents).await?;

                let mut plaintext = Vec::with_capacity(filename.len() + contents.len());
                plaintext.extend_from_slice(filename.as_bytes());
                plaintext.extend_from_slice(&contents);

                let mut wire = Vec::new();
                let total = self
                    .codec
                    .serialize(
                        &mut wire,
                        MessageType::StoreFile,
                        self.node_id,
                        filename.len() as u32,
                        &plaintext,
                    )
                    .await?;

                let peer_id = frame.source_id as u8;
                if !self.peers.send_to(peer_id, &wire, total).await {
                    warn!(peer_id, filename = %filename, "failed to reply to GET_FILE requester");
                }
            }
        }
        Ok(())
    }

    /// Runs the channel listener until `shutdown` is called: pops frames and
    /// dispatches them.
    pub async fn run(self: Arc<Self>) {
        loop {
            let shutdown = self.shutdown_notify.notified();
            tokio::select! {
                frame = self.frames.recv() => {
                    if let Err(e) = self.dispatch(frame).await {
                        warn!(error = %e, "dispatch failed");
                    }
                }
                _ = shutdown => break,
            }
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.shutdown_notify.notify_waiters();
    }
}

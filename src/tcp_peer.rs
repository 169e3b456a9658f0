//! One connected remote peer: owns a socket, runs a background read loop, and
//! provides framed outbound writes guarded by a single write lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::error::{DfsError, DfsResult};

/// Bounded chunk size used when streaming an outbound frame to the socket.
const SEND_CHUNK_SIZE: usize = 8 * 1024;

/// Bound on joining the read loop task after `stop_read_loop` signals it to stop.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    Initial,
    Reading,
    Stopped,
}

/// Owns one peer's TCP connection. Cheap to clone via `Arc`; the read half lives
/// only inside the spawned read-loop task, taken out of an inner `Option` exactly
/// once.
pub struct TcpPeer {
    write_half: Mutex<OwnedWriteHalf>,
    read_half: Mutex<Option<OwnedReadHalf>>,
    state: Mutex<PeerState>,
    stop_signal: Notify,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpPeer {
    pub fn new(stream: TcpStream) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        Arc::new(Self {
            write_half: Mutex::new(write_half),
            read_half: Mutex::new(Some(read_half)),
            state: Mutex::new(PeerState::Initial),
            stop_signal: Notify::new(),
            read_task: Mutex::new(None),
        })
    }

    /// Writes a 4-byte big-endian length prefix followed by `total_size` bytes
    /// drained from `data`, in chunks of at most 8 KiB. Holds the write lock for
    /// the whole frame so concurrent sends never interleave.
    pub async fn send(&self, data: &[u8], total_size: u64) -> DfsResult<()> {
        if *self.state.lock().await == PeerState::Stopped {
            return Err(DfsError::Network("peer is not connected".into()));
        }

        let mut socket = self.write_half.lock().await;
        socket
            .write_all(&(total_size as u32).to_be_bytes())
            .await
            .map_err(|e| DfsError::Network(e.to_string()))?;

        for chunk in data.chunks(SEND_CHUNK_SIZE) {
            socket
                .write_all(chunk)
                .await
                .map_err(|e| DfsError::Network(e.to_string()))?;
        }
        socket.flush().await.map_err(|e| DfsError::Network(e.to_string()))?;
        Ok(())
    }

    /// Spawns the background read loop. `processor` is invoked once per inbound
    /// frame body with the raw bytes (length-prefix already stripped).
    pub async fn start_read_loop<F, Fut>(self: &Arc<Self>, processor: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let Some(mut read_half) = self.read_half.lock().await.take() else {
            return;
        };
        *self.state.lock().await = PeerState::Reading;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let mut len_buf = [0u8; 4];
                tokio::select! {
                    result = read_half.read_exact(&mut len_buf) => {
                        if result.is_err() {
                            break;
                        }
                    }
                    _ = this.stop_signal.notified() => break,
                }
                let len = u32::from_be_bytes(len_buf) as usize;

                let mut body = vec![0u8; len];
                tokio::select! {
                    result = read_half.read_exact(&mut body) => {
                        if result.is_err() {
                            break;
                        }
                    }
                    _ = this.stop_signal.notified() => break,
                }

                processor(body).await;
            }
            *this.state.lock().await = PeerState::Stopped;
        });

        *self.read_task.lock().await = Some(handle);
    }

    /// Signals cancellation, shuts down the write half so the peer sees a clean
    /// close, and joins the read task, bounded by a 5 s timeout. The cancellation
    /// signal races the read loop's in-flight `read_exact` via `select!`, so a
    /// peer that's alive but silent no longer pins the task open until it speaks.
    /// Safe to call when the loop isn't running.
    pub async fn stop_read_loop(&self) {
        self.stop_signal.notify_one();

        {
            let mut socket = self.write_half.lock().await;
            let _ = socket.shutdown().await;
        }

        let handle = self.read_task.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await;
        }
        *self.state.lock().await = PeerState::Stopped;
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.lock().await != PeerState::Stopped
    }
}

impl std::fmt::Debug for TcpPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeer").finish_non_exhaustive()
    }
}

//! Content-addressed on-disk storage.
//!
//! Keys (typically filenames) are hashed with SHA-256 and the lowercase hex digest
//! is sharded into a three-level directory tree so that no directory ever holds more
//! than a handful of thousand entries, regardless of how many keys the node stores.
//! Path traversal is a non-issue here: the store never interprets the key as a path,
//! only as hash input.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DfsError, DfsResult};

/// Bounded buffer size used for all streaming store/get copies.
const STREAM_BUFFER_SIZE: usize = 8 * 1024;

/// A lowercase hex SHA-256 digest of a store key (64 characters).
pub type ContentAddress = String;

/// Computes the content address for a key.
pub fn content_address(key: &str) -> ContentAddress {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Content-addressed file store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct Store {
    base: PathBuf,
}

impl Store {
    /// Creates a store rooted at `base`. The directory is not created until first use.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Resolves a key to its on-disk path: `base/h[0:2]/h[2:4]/h[4:6]/h[6:64]`.
    pub fn resolve_path(&self, key: &str) -> PathBuf {
        let hash = content_address(key);
        self.base
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(&hash[4..6])
            .join(&hash[6..64])
    }

    /// Streams `reader` to the file resolved for `key`, creating intermediate
    /// directories as needed. Overwrites any existing file under that key.
    pub async fn store<R>(&self, key: &str, mut reader: R) -> DfsResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        let mut buf = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Streams the stored bytes for `key` into `writer`.
    pub async fn get<W>(&self, key: &str, mut writer: W) -> DfsResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let path = self.resolve_path(key);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| map_missing(e, key))?;

        let mut buf = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Pure existence check; never fails.
    pub async fn has(&self, key: &str) -> bool {
        fs::metadata(self.resolve_path(key)).await.is_ok()
    }

    /// Removes the stored file for `key`. Does not prune now-empty parent
    /// directories (left for a future administrative sweep, not this store's job).
    pub async fn remove(&self, key: &str) -> DfsResult<()> {
        let path = self.resolve_path(key);
        fs::remove_file(&path).await.map_err(|e| map_missing(e, key))
    }

    /// Removes every entry under the base path, then recreates the base directory.
    pub async fn clear(&self) -> DfsResult<()> {
        if fs::metadata(&self.base).await.is_ok() {
            fs::remove_dir_all(&self.base).await?;
        }
        fs::create_dir_all(&self.base).await?;
        Ok(())
    }

    /// Returns the on-disk size in bytes of the file stored under `key`.
    pub async fn file_size(&self, key: &str) -> DfsResult<u64> {
        let path = self.resolve_path(key);
        let meta = fs::metadata(&path).await.map_err(|e| map_missing(e, key))?;
        Ok(meta.len())
    }
}

fn map_missing(error: std::io::Error, key: &str) -> DfsError {
    if error.kind() == std::io::ErrorKind::NotFound {
        DfsError::NotFound(key.to_string())
    } else {
        DfsError::Io(error.to_string())
    }
}

//! Loads the 32-byte shared key every peer link encrypts with. On first run,
//! when no key file exists yet, one is generated and persisted so subsequent
//! runs reuse it.

use std::path::Path;

use rand::RngCore;
use tracing::info;

use crate::crypto_stream::KEY_SIZE;
use crate::error::{DfsError, DfsResult};

/// Loads the key at `path`, generating and writing a fresh one if absent.
pub fn load_or_generate(path: &Path) -> DfsResult<[u8; KEY_SIZE]> {
    if path.exists() {
        return load(path);
    }

    let mut key = [0u8; KEY_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| DfsError::Crypto(format!("failed to generate key: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, hex::encode(key))?;
    info!(path = %path.display(), "generated new shared key");

    Ok(key)
}

/// Reads and hex-decodes an existing key file.
pub fn load(path: &Path) -> DfsResult<[u8; KEY_SIZE]> {
    let contents = std::fs::read_to_string(path)?;
    let bytes = hex::decode(contents.trim())
        .map_err(|e| DfsError::InvalidParameters(format!("key file is not valid hex: {e}")))?;

    if bytes.len() != KEY_SIZE {
        return Err(DfsError::InvalidParameters(format!(
            "key must decode to {KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

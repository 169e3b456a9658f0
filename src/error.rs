// ===================================================================================================
// Error Handling System - Error Types for the Distributed File Store
// ===================================================================================================
//
// Structured error types for the node's core subsystems, enabling precise error
// categorization and appropriate recovery at each layer (store, crypto, codec,
// network). Each variant carries a descriptive message rather than a typed source,
// matching the taxonomy the rest of the system is built around: callers match on
// the *kind* of failure, not on a specific upstream error type.
//
// ===================================================================================================

use std::fmt;

/// Error kinds used across the store, crypto, codec, and network layers.
#[derive(Debug)]
pub enum DfsError {
    /// Invalid constructor parameters: wrong key size, empty address, bad port.
    /// Always fails fast before any I/O is attempted.
    InvalidParameters(String),

    /// Filesystem read/write/create/remove failure.
    Io(String),

    /// RNG failure, padding failure, or cipher initialization failure.
    Crypto(String),

    /// Connect, accept, send, recv, or resolve failure.
    Network(String),

    /// Store `get`/`remove`/`file_size` on a key that doesn't exist.
    NotFound(String),

    /// A deserialized frame's `payload_size` exceeded the configured cap.
    FrameTooLarge { size: u64, limit: u64 },

    /// Invalid or unreadable node configuration.
    Config(String),
}

impl fmt::Display for DfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfsError::InvalidParameters(e) => write!(f, "invalid parameters: {e}"),
            DfsError::Io(e) => write!(f, "IO error: {e}"),
            DfsError::Crypto(e) => write!(f, "cryptographic error: {e}"),
            DfsError::Network(e) => write!(f, "network error: {e}"),
            DfsError::NotFound(e) => write!(f, "not found: {e}"),
            DfsError::FrameTooLarge { size, limit } => {
                write!(f, "frame payload of {size} bytes exceeds the {limit} byte cap")
            }
            DfsError::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for DfsError {}

impl From<std::io::Error> for DfsError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            DfsError::NotFound(error.to_string())
        } else {
            DfsError::Io(error.to_string())
        }
    }
}

impl From<toml::de::Error> for DfsError {
    fn from(error: toml::de::Error) -> Self {
        DfsError::Config(format!("TOML parse error: {error}"))
    }
}

impl From<toml::ser::Error> for DfsError {
    fn from(error: toml::ser::Error) -> Self {
        DfsError::Config(format!("TOML serialize error: {error}"))
    }
}

/// Result type alias used throughout the crate.
pub type DfsResult<T> = Result<T, DfsError>;

// ===================================================================================================
// dfs-node - Distributed Content-Addressed File Store (library)
// ===================================================================================================
//
// Peer nodes share files over authenticated, encrypted TCP links with no central
// coordinator; peers find each other only through a static bootstrap list.
//
// ## KEY DESIGN PRINCIPLES
//
// ### 1. Content addressing
// Every stored file is keyed by the SHA-256 hash of its name, sharded into a
// three-level hex directory tree.
//
// ### 2. Streaming discipline
// Encryption, decryption, and file I/O all work in bounded 8 KiB chunks; nothing
// buffers a whole file unless the wire protocol genuinely needs it in memory
// (a broadcast payload, replayed once per peer).
//
// ### 3. Capability-narrowed orchestration
// `FileServer` depends on `PeerSink`/`FrameSource`, not on the concrete
// `PeerManager`/`Channel` types, so its dispatch logic can be tested without a
// real socket.
//
// ===================================================================================================

// ===== CORE STORAGE AND CRYPTOGRAPHY =====
pub mod crypto_stream; // AES-256-CBC streaming encrypt/decrypt with generated IVs
pub mod store; // Content-addressed on-disk storage

// ===== WIRE PROTOCOL AND PEER LIFECYCLE =====
pub mod channel; // FIFO queue of decoded frames between Codec and FileServer
pub mod codec; // MessageFrame serialization/deserialization
pub mod peer_manager; // Registry of connected peers; targeted send and broadcast
pub mod tcp_peer; // One connected peer: socket, read loop, framed writes

// ===== ORCHESTRATION =====
pub mod bootstrap; // Composition root: wires everything together, drives startup/shutdown
pub mod file_server; // Local store/get API; dispatch of inbound frames

// ===== CONFIGURATION, CLI, AND OBSERVABILITY =====
pub mod cli; // Command-line argument parsing using clap
pub mod config; // NodeConfig: TOML-loadable node configuration
pub mod key_material; // Shared key loading/generation
pub mod logging; // Structured logging and tracing

// ===== RELIABILITY =====
pub mod error; // Crate-wide error type and result alias

// ===== CONVENIENCE RE-EXPORTS =====

pub use bootstrap::Bootstrap;
pub use codec::{Codec, MessageFrame, MessageType};
pub use config::NodeConfig;
pub use error::{DfsError, DfsResult};
pub use file_server::FileServer;
pub use peer_manager::{BroadcastResult, PeerManager};
pub use store::Store;

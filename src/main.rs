// ===================================================================================================
// dfs-node - Distributed Content-Addressed File Store
// ===================================================================================================
//
// A peer-to-peer node that shares files over authenticated, encrypted TCP links.
// There is no central coordinator: peers discover each other only through a static
// bootstrap list, and replication is best-effort broadcast.
//
// ## ARCHITECTURE OVERVIEW
//
// ### 1. Content-addressed storage (store.rs)
// - Files are keyed by the SHA-256 hash of their name, sharded into a three-level
//   hex directory tree so no directory holds more than a handful of entries.
//
// ### 2. Streaming encryption (crypto_stream.rs)
// - AES-256-CBC with a fresh IV per frame, processed in bounded 8 KiB chunks so a
//   node never buffers a whole file just to encrypt or decrypt it.
//
// ### 3. Wire framing (codec.rs, tcp_peer.rs)
// - A 33-byte header carries the IV, message type, source id, and sizes; a 4-byte
//   length prefix delimits each frame on the socket.
//
// ### 4. Peer lifecycle and routing (tcp_peer.rs, peer_manager.rs, channel.rs,
//    file_server.rs)
// - Each peer owns one socket and a background read loop; the registry supports
//   targeted sends and best-effort broadcast; a dispatcher task drains the shared
//   channel and applies STORE_FILE/GET_FILE frames without ever re-broadcasting
//   what it received.
//
// ===================================================================================================

mod channel;
mod cli;
mod codec;
mod config;
mod crypto_stream;
mod error;
mod file_server;
mod key_material;
mod logging;
mod peer_manager;
mod store;
mod tcp_peer;

mod bootstrap;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;

use crate::bootstrap::Bootstrap;
use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init_logging_safe();

    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            logging::log_error_with_context("failed to resolve node configuration", &e);
            std::process::exit(1);
        }
    };

    let key = match key_material::load_or_generate(&config.key_path) {
        Ok(key) => key,
        Err(e) => {
            logging::log_error_with_context("failed to load shared key", &e);
            std::process::exit(1);
        }
    };

    tracing::info!(node_id = config.node_id, "starting dfs-node");

    let bootstrap = Arc::new(Bootstrap::new(config, key));

    if let Err(e) = bootstrap.start().await {
        logging::log_error_with_context("failed to start node", &e);
        std::process::exit(1);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");
    bootstrap.shutdown().await;

    Ok(())
}

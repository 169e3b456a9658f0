//! Command-line interface for the dfs-node binary using Clap.
//!
//! The CLI only ever builds a [`crate::config::NodeConfig`] and hands it off to
//! `bootstrap`; it stays a thin translation layer over the config file rather
//! than a place for business logic.

use std::path::PathBuf;

use clap::Parser;

use crate::config::NodeConfig;

/// A node in the distributed content-addressed file store.
#[derive(Parser, Debug, Clone)]
#[command(name = "dfs-node")]
pub struct Cli {
    /// Path to a TOML configuration file. Falls back to defaults if absent.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// This node's 8-bit peer identifier.
    #[arg(long)]
    pub node_id: Option<u8>,
    /// Address to listen on.
    #[arg(long)]
    pub listen_address: Option<String>,
    /// Port to listen on.
    #[arg(long)]
    pub listen_port: Option<u16>,
    /// Bootstrap peers to dial at startup, as "host:port" (repeatable).
    #[arg(long, value_name = "HOST:PORT")]
    pub bootstrap_peer: Vec<String>,
    /// Base directory for this node's stored files.
    #[arg(long, help = "Base directory for stored files")]
    pub storage_root: Option<PathBuf>,
    /// Path to the shared key file; generated on first run if absent.
    #[arg(long, help = "Path to the shared key file")]
    pub key_path: Option<PathBuf>,
}

impl Cli {
    /// Loads the base `NodeConfig` (from `--config`, or defaults) and overlays
    /// any explicitly-given CLI flags on top of it.
    pub fn resolve_config(&self) -> crate::error::DfsResult<NodeConfig> {
        let mut config = NodeConfig::load_or_default(self.config.clone())?;

        if let Some(node_id) = self.node_id {
            config.node_id = node_id;
        }
        if let Some(ref addr) = self.listen_address {
            config.listen_address = addr.clone();
        }
        if let Some(port) = self.listen_port {
            config.listen_port = port;
        }
        if !self.bootstrap_peer.is_empty() {
            config.bootstrap_peers = self.bootstrap_peer.clone();
        }
        if let Some(ref root) = self.storage_root {
            config.storage_root = root.clone();
        }
        if let Some(ref key_path) = self.key_path {
            config.key_path = key_path.clone();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_flags_override_default_config() {
        let cli = Cli::parse_from([
            "dfs-node",
            "--node-id",
            "4",
            "--listen-port",
            "9100",
            "--bootstrap-peer",
            "10.0.0.1:7878",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.node_id, 4);
        assert_eq!(config.listen_port, 9100);
        assert_eq!(config.bootstrap_peers, vec!["10.0.0.1:7878".to_string()]);
    }

    #[test]
    fn no_flags_yields_default_config() {
        let cli = Cli::parse_from(["dfs-node"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.node_id, NodeConfig::default().node_id);
    }
}

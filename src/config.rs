//! Node configuration: listen address, node identifier, storage root, key file
//! path, and the static bootstrap peer list. Loaded from TOML, falling back to
//! defaults when no config file is given.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DfsResult;

/// A node's full runtime configuration: identity, listen address, storage
/// location, key file, and the peers to dial at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 8-bit identifier this node presents during the handshake.
    pub node_id: u8,
    pub listen_address: String,
    pub listen_port: u16,
    /// Static "host:port" peers dialed at startup.
    pub bootstrap_peers: Vec<String>,
    /// Base directory under which `fileserver_<node_id>/` is created.
    pub storage_root: PathBuf,
    /// Path to the 32-byte shared key file (see `key_material`). Never the raw
    /// key bytes themselves — those never touch the config file.
    pub key_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            listen_address: "0.0.0.0".to_string(),
            listen_port: 7878,
            bootstrap_peers: vec![],
            storage_root: PathBuf::from("."),
            key_path: PathBuf::from("dfs-node.key"),
        }
    }
}

impl NodeConfig {
    /// Loads configuration from `config_path` if given and present, otherwise
    /// falls back to `NodeConfig::default()`.
    pub fn load_or_default(config_path: Option<PathBuf>) -> DfsResult<Self> {
        if let Some(path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(&path)?;
                let config: NodeConfig = toml::from_str(&contents)?;
                tracing::info!(path = %path.display(), "loaded node configuration");
                return Ok(config);
            }
        }

        tracing::info!("using default node configuration");
        Ok(NodeConfig::default())
    }

    /// Serializes and writes this configuration to `config_path`, creating
    /// intermediate directories as needed.
    pub fn save(&self, config_path: &PathBuf) -> DfsResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(config_path, contents)?;
        tracing::info!(path = %config_path.display(), "saved node configuration");
        Ok(())
    }

    /// The per-node storage directory: `<storage_root>/fileserver_<node_id>/`.
    pub fn node_storage_dir(&self) -> PathBuf {
        self.storage_root.join(format!("fileserver_{}", self.node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = NodeConfig::default();
        assert_eq!(config.node_id, 0);
        assert_eq!(config.listen_port, 7878);
        assert!(config.bootstrap_peers.is_empty());
    }

    #[test]
    fn load_or_default_without_path_yields_default() {
        let config = NodeConfig::load_or_default(None).unwrap();
        assert_eq!(config.node_id, NodeConfig::default().node_id);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");

        let mut config = NodeConfig::default();
        config.node_id = 5;
        config.listen_port = 9000;
        config.bootstrap_peers = vec!["127.0.0.1:7879".to_string()];
        config.save(&path).unwrap();

        let loaded = NodeConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.node_id, 5);
        assert_eq!(loaded.listen_port, 9000);
        assert_eq!(loaded.bootstrap_peers, vec!["127.0.0.1:7879".to_string()]);
    }

    #[test]
    fn node_storage_dir_is_namespaced_by_node_id() {
        let mut config = NodeConfig::default();
        config.node_id = 3;
        config.storage_root = PathBuf::from("/tmp/store");
        assert_eq!(config.node_storage_dir(), PathBuf::from("/tmp/store/fileserver_3"));
    }
}

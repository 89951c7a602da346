//! Client configuration.

use crate::Args;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Debug log filter (tracing `EnvFilter` syntax).
    #[serde(default)]
    pub debug: Option<String>,
    /// Data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Storage backend.
    #[serde(default)]
    pub storage: StorageKind,
    /// Blocks subtracted from the anchor head before events are final.
    #[serde(default = "default_finality_depth")]
    pub finality_depth: u64,
    /// Anchor event polling period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub event_poll_interval_ms: u64,
    /// Operator sync polling period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub transaction_poll_interval_ms: u64,
    /// Operator liveness check period in milliseconds.
    #[serde(default = "default_ping_interval_ms")]
    pub operator_ping_interval_ms: u64,
    /// Anchor-chain registry contract address.
    #[serde(default)]
    pub registry_address: Option<String>,
    /// Chain identifier resolved through the registry.
    #[serde(default)]
    pub plasma_chain_name: Option<String>,
    /// Anchor JSON-RPC endpoint.
    #[serde(default = "default_ethereum_endpoint")]
    pub ethereum_endpoint: String,
    /// Address of the ownership predicate deposits are stamped with.
    #[serde(default)]
    pub ownership_predicate: Option<String>,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Persistent RocksDB database.
    #[default]
    Rocksdb,
    /// Ephemeral in-memory storage.
    Memory,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".plasma")
}

fn default_finality_depth() -> u64 {
    12
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_ping_interval_ms() -> u64 {
    10_000
}

fn default_ethereum_endpoint() -> String {
    "http://localhost:8545".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debug: None,
            data_dir: default_data_dir(),
            storage: StorageKind::default(),
            finality_depth: default_finality_depth(),
            event_poll_interval_ms: default_poll_interval_ms(),
            transaction_poll_interval_ms: default_poll_interval_ms(),
            operator_ping_interval_ms: default_ping_interval_ms(),
            registry_address: None,
            plasma_chain_name: None,
            ethereum_endpoint: default_ethereum_endpoint(),
            ownership_predicate: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        if let Some(ref data_dir) = args.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(ref endpoint) = args.ethereum_endpoint {
            config.ethereum_endpoint = endpoint.clone();
        }
        if let Some(ref debug) = args.debug {
            config.debug = Some(debug.clone());
        }
        if args.memory_storage {
            config.storage = StorageKind::Memory;
        }

        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

//! On-disk recovery store: one JSON document per network.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/<network-id>/config.json
//! ```
//!
//! Entries are written after every successful Create-Network, deleted on
//! Delete-Network, and enumerated once at startup to replay network
//! creation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sriovmgr_common::{DriverError, DriverResult};

/// Default persistence root.
pub const DEFAULT_CONFIG_ROOT: &str = "/etc/docker/mellanox/sriovmgrd";

/// Per-network document name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Current on-disk format version.
pub const CONFIG_VERSION: u32 = 1;

/// Durable mirror of a network's creation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    /// On-disk format version.
    #[serde(rename = "Version")]
    pub version: u32,
    /// Physical device name.
    #[serde(rename = "Netdevice")]
    pub netdevice: String,
    /// Network mode string.
    #[serde(rename = "Mode")]
    pub mode: String,
    /// IPAM pool subnet in CIDR form; empty when none was assigned.
    #[serde(rename = "Subnet")]
    pub subnet: String,
    /// Gateway in CIDR form.
    #[serde(rename = "Gateway")]
    pub gateway: String,
    /// VLAN tag (0 = untagged).
    #[serde(rename = "Vlan")]
    pub vlan: u16,
    /// Privileged flag.
    #[serde(rename = "Privileged")]
    pub privileged: bool,
}

/// JSON-per-network-directory config store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Creates a store over the given root directory. The directory is
    /// created lazily on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ConfigStore { root: root.into() }
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn network_dir(&self, network_id: &str) -> PathBuf {
        self.root.join(network_id)
    }

    fn config_path(&self, network_id: &str) -> PathBuf {
        self.network_dir(network_id).join(CONFIG_FILE_NAME)
    }

    /// Writes (or overwrites) a network's entry, creating parent
    /// directories as needed.
    pub fn write(&self, network_id: &str, entry: &NetworkEntry) -> DriverResult<()> {
        let dir = self.network_dir(network_id);
        fs::create_dir_all(&dir).map_err(|e| DriverError::store(&dir, e.to_string()))?;

        let raw = serde_json::to_vec(entry)
            .map_err(|e| DriverError::store(self.config_path(network_id), e.to_string()))?;
        let path = self.config_path(network_id);
        fs::write(&path, raw).map_err(|e| DriverError::store(&path, e.to_string()))
    }

    /// Reads a network's entry; a missing directory is absence, not an
    /// error.
    pub fn read(&self, network_id: &str) -> DriverResult<Option<NetworkEntry>> {
        let path = self.config_path(network_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DriverError::store(&path, e.to_string())),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| DriverError::store(&path, e.to_string()))
    }

    /// Enumerates every persisted network, ordered by id.
    ///
    /// An unreadable entry aborts the whole enumeration: a corrupt store
    /// must not silently drop networks.
    pub fn read_all(&self) -> DriverResult<Vec<(String, NetworkEntry)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DriverError::store(&self.root, e.to_string())),
        };

        let mut networks: Vec<(String, NetworkEntry)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DriverError::store(&self.root, e.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            let network_id = entry.file_name().to_string_lossy().into_owned();
            let network_entry = self.read(&network_id)?.ok_or_else(|| {
                DriverError::store(self.config_path(&network_id), "missing config.json")
            })?;
            networks.push((network_id, network_entry));
        }
        networks.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(networks)
    }

    /// Removes a network's entry; an already-missing directory is ignored.
    pub fn delete(&self, network_id: &str) -> DriverResult<()> {
        let dir = self.network_dir(network_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::store(&dir, e.to_string())),
        }
    }
}

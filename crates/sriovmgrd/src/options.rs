//! Network-creation options: keys, defaults, and validation.
//!
//! Options arrive as the generic string map of a Create-Network request.
//! Validation happens here, before any hardware or persisted state is
//! touched; a request that fails parsing has no side effects.

use std::collections::HashMap;

use sriovmgr_common::{DriverError, DriverResult};
use sriovmgr_types::VlanTag;

use crate::store::NetworkEntry;
use crate::types::NetworkMode;

/// Physical netdevice the network is bound to (`-o netdevice=...`). Required.
pub const OPT_NETDEVICE: &str = "netdevice";

/// Network mode (`passthrough` or `sriov`). Defaults to passthrough.
pub const OPT_MODE: &str = "mode";

/// VLAN tag for SR-IOV networks; 0 (the default) leaves traffic untagged.
pub const OPT_VLAN: &str = "vlan";

/// Privileged flag ("1" maps to trusted VFs with spoof checking off).
pub const OPT_PRIVILEGED: &str = "privileged";

/// Interface-name prefix exposed inside the container.
pub const OPT_PREFIX: &str = "prefix";

/// RoCE hop-limit override applied to each allocated VF's RDMA device.
pub const OPT_ROCE_HOP_LIMIT: &str = "rocehoplimit";

/// Mode option value for passthrough networks.
pub const MODE_PASSTHROUGH: &str = "passthrough";

/// Mode option value for SR-IOV networks.
pub const MODE_SRIOV: &str = "sriov";

/// Default container-side interface prefix.
pub const DEFAULT_ETH_PREFIX: &str = "eth";

/// Validated creation options for one network.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Physical device name.
    pub netdevice: String,
    /// Requested mode.
    pub mode: NetworkMode,
    /// VLAN tag; untagged unless the caller asked otherwise.
    pub vlan: VlanTag,
    /// Privileged endpoints (trust on, spoof checking off).
    pub privileged: bool,
    /// Container-side interface prefix.
    pub eth_prefix: String,
    /// RoCE hop-limit override, when configured.
    pub roce_hop_limit: Option<u8>,
}

impl NetworkOptions {
    /// Parses and validates the generic option map of a creation request.
    pub fn parse(options: &HashMap<String, String>) -> DriverResult<Self> {
        let mode = match options.get(OPT_MODE).map(String::as_str) {
            None | Some("") => NetworkMode::Passthrough,
            Some(raw) => NetworkMode::from_option(raw).ok_or_else(|| {
                DriverError::invalid_config(OPT_MODE, "valid modes are: passthrough and sriov")
            })?,
        };

        let netdevice = options
            .get(OPT_NETDEVICE)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| {
                DriverError::invalid_config(
                    OPT_NETDEVICE,
                    format!("{} mode requires a netdevice", mode),
                )
            })?;

        let vlan = match options.get(OPT_VLAN).map(String::as_str) {
            None | Some("") => VlanTag::UNTAGGED,
            Some(raw) => raw
                .parse::<VlanTag>()
                .map_err(|e| DriverError::invalid_config(OPT_VLAN, e.to_string()))?,
        };

        let privileged = options
            .get(OPT_PRIVILEGED)
            .map(|value| value == "1")
            .unwrap_or(false);

        let eth_prefix = options
            .get(OPT_PREFIX)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ETH_PREFIX.to_string());

        let roce_hop_limit = match options.get(OPT_ROCE_HOP_LIMIT).map(String::as_str) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u8>().map_err(|_| {
                DriverError::invalid_config(OPT_ROCE_HOP_LIMIT, "valid range is 0-255")
            })?),
        };

        Ok(NetworkOptions {
            netdevice,
            mode,
            vlan,
            privileged,
            eth_prefix,
            roce_hop_limit,
        })
    }

    /// Rebuilds options from a persisted store entry for startup replay.
    ///
    /// The interface prefix is not persisted, so replayed networks get the
    /// default.
    pub fn from_entry(entry: &NetworkEntry) -> DriverResult<Self> {
        let mode = NetworkMode::from_option(&entry.mode).ok_or_else(|| {
            DriverError::invalid_config(OPT_MODE, format!("unknown persisted mode '{}'", entry.mode))
        })?;
        let vlan = VlanTag::new(entry.vlan)
            .map_err(|e| DriverError::invalid_config(OPT_VLAN, e.to_string()))?;

        Ok(NetworkOptions {
            netdevice: entry.netdevice.clone(),
            mode,
            vlan,
            privileged: entry.privileged,
            eth_prefix: DEFAULT_ETH_PREFIX.to_string(),
            roce_hop_limit: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let parsed = NetworkOptions::parse(&opts(&[("netdevice", "eth1")])).unwrap();
        assert_eq!(parsed.mode, NetworkMode::Passthrough);
        assert_eq!(parsed.netdevice, "eth1");
        assert!(parsed.vlan.is_untagged());
        assert!(!parsed.privileged);
        assert_eq!(parsed.eth_prefix, "eth");
        assert_eq!(parsed.roce_hop_limit, None);
    }

    #[test]
    fn test_sriov_options() {
        let parsed = NetworkOptions::parse(&opts(&[
            ("netdevice", "eth1"),
            ("mode", "sriov"),
            ("vlan", "10"),
            ("privileged", "1"),
            ("prefix", "net"),
        ]))
        .unwrap();
        assert_eq!(parsed.mode, NetworkMode::Sriov);
        assert_eq!(parsed.vlan.as_u16(), 10);
        assert!(parsed.privileged);
        assert_eq!(parsed.eth_prefix, "net");
    }

    #[test]
    fn test_missing_netdevice() {
        let err = NetworkOptions::parse(&opts(&[("mode", "sriov")])).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("netdevice"));

        // Passthrough needs one too.
        let err = NetworkOptions::parse(&opts(&[])).unwrap_err();
        assert!(err.to_string().contains("passthrough mode requires"));
    }

    #[test]
    fn test_unknown_mode() {
        let err =
            NetworkOptions::parse(&opts(&[("netdevice", "eth1"), ("mode", "macvlan")]))
                .unwrap_err();
        assert!(err.to_string().contains("valid modes are"));
    }

    #[test]
    fn test_vlan_range() {
        let parsed = NetworkOptions::parse(&opts(&[
            ("netdevice", "eth1"),
            ("mode", "sriov"),
            ("vlan", "4095"),
        ]))
        .unwrap();
        assert_eq!(parsed.vlan.as_u16(), 4095);

        let err = NetworkOptions::parse(&opts(&[
            ("netdevice", "eth1"),
            ("mode", "sriov"),
            ("vlan", "4096"),
        ]))
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_privileged_only_accepts_one() {
        let parsed =
            NetworkOptions::parse(&opts(&[("netdevice", "eth1"), ("privileged", "0")])).unwrap();
        assert!(!parsed.privileged);
        let parsed =
            NetworkOptions::parse(&opts(&[("netdevice", "eth1"), ("privileged", "yes")])).unwrap();
        assert!(!parsed.privileged);
    }

    #[test]
    fn test_roce_hop_limit_range() {
        let parsed = NetworkOptions::parse(&opts(&[
            ("netdevice", "eth1"),
            ("rocehoplimit", "255"),
        ]))
        .unwrap();
        assert_eq!(parsed.roce_hop_limit, Some(255));

        let err = NetworkOptions::parse(&opts(&[
            ("netdevice", "eth1"),
            ("rocehoplimit", "256"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("0-255"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let parsed = NetworkOptions::parse(&opts(&[
            ("netdevice", "eth1"),
            ("com.docker.network.generic", "x"),
        ]))
        .unwrap();
        assert_eq!(parsed.netdevice, "eth1");
    }

    #[test]
    fn test_from_entry() {
        let entry = NetworkEntry {
            version: 1,
            netdevice: "eth1".to_string(),
            mode: "sriov".to_string(),
            subnet: "10.0.0.0/24".to_string(),
            gateway: "10.0.0.1/24".to_string(),
            vlan: 10,
            privileged: true,
        };
        let parsed = NetworkOptions::from_entry(&entry).unwrap();
        assert_eq!(parsed.mode, NetworkMode::Sriov);
        assert_eq!(parsed.vlan.as_u16(), 10);
        assert!(parsed.privileged);
        assert_eq!(parsed.eth_prefix, "eth");
    }
}

//! The generic network record and the closed set of mode variants.

use std::collections::HashMap;

use sriovmgr_types::VlanTag;

use crate::dualport::DualPortNetwork;
use crate::options::NetworkOptions;
use crate::passthrough::PassthroughNetwork;
use crate::sriov::SriovNetwork;
use crate::types::{Endpoint, IpamConfig, NetworkMode};

/// Fields shared by every network variant.
#[derive(Debug)]
pub struct GenericNetwork {
    /// Network id assigned by the orchestrator.
    pub id: String,
    /// Physical netdevice the network is bound to.
    pub ndev_name: String,
    /// Requested mode (the dual-port refinement lives in the variant).
    pub mode: NetworkMode,
    /// Container-side interface prefix.
    pub eth_prefix: String,
    /// Validated IPAM data.
    pub ipam: IpamConfig,
    /// Endpoints keyed by endpoint id.
    pub endpoints: HashMap<String, Endpoint>,
}

impl GenericNetwork {
    /// Creates an empty record from validated creation inputs.
    pub fn new(id: &str, options: &NetworkOptions, ipam: IpamConfig) -> Self {
        GenericNetwork {
            id: id.to_string(),
            ndev_name: options.netdevice.clone(),
            mode: options.mode,
            eth_prefix: options.eth_prefix.clone(),
            ipam,
            endpoints: HashMap::new(),
        }
    }
}

/// The three mode implementations as a closed set.
///
/// New modes extend this enum deliberately; there is no open dispatch.
#[derive(Debug)]
pub enum NetworkVariant {
    /// One physical device handed to one container.
    Passthrough(PassthroughNetwork),
    /// Single-port SR-IOV with sysfs VF enumeration.
    Sriov(SriovNetwork),
    /// Dual-port SR-IOV with port-map VF discovery.
    DualPort(DualPortNetwork),
}

/// One logical network: shared record plus mode-specific state.
#[derive(Debug)]
pub struct Network {
    /// Shared fields.
    pub gen: GenericNetwork,
    /// Mode-specific state and behavior.
    pub variant: NetworkVariant,
}

impl Network {
    /// The VLAN this network segregates traffic into; untagged for
    /// passthrough and dual-port networks.
    pub fn vlan(&self) -> VlanTag {
        match &self.variant {
            NetworkVariant::Sriov(nw) => nw.vlan,
            NetworkVariant::Passthrough(_) | NetworkVariant::DualPort(_) => VlanTag::UNTAGGED,
        }
    }

    /// Label used in logs.
    pub fn variant_label(&self) -> &'static str {
        match &self.variant {
            NetworkVariant::Passthrough(_) => "passthrough",
            NetworkVariant::Sriov(_) => "sriov",
            NetworkVariant::DualPort(_) => "dualport-sriov",
        }
    }
}

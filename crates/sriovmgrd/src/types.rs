//! Type definitions for the plugin driver.

use std::fmt;

use crate::pool::VfToken;
use sriovmgr_types::Ipv4Net;

/// Network mode requested through the `mode` creation option.
///
/// Dual-port SR-IOV is not a mode of its own: a `sriov` request on a
/// multi-port device selects the dual-port variant during creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Hand the physical device itself to a single container.
    Passthrough,
    /// Carve virtual functions out of the device.
    Sriov,
}

impl NetworkMode {
    /// Parses the option value; `None` for anything unrecognized.
    pub fn from_option(value: &str) -> Option<Self> {
        match value {
            crate::options::MODE_PASSTHROUGH => Some(NetworkMode::Passthrough),
            crate::options::MODE_SRIOV => Some(NetworkMode::Sriov),
            _ => None,
        }
    }

    /// Returns the option/store spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Passthrough => crate::options::MODE_PASSTHROUGH,
            NetworkMode::Sriov => crate::options::MODE_SRIOV,
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated IPAM data for a network.
#[derive(Debug, Clone)]
pub struct IpamConfig {
    /// The address pool (subnet) the orchestrator assigned, if any.
    pub pool: Option<Ipv4Net>,
    /// The network gateway; unique across all networks.
    pub gateway: Ipv4Net,
}

/// Raw IPAM data as it arrives on the wire, before validation.
#[derive(Debug, Clone, Default)]
pub struct IpamRequest {
    /// Pool subnet in CIDR form.
    pub pool: Option<String>,
    /// Gateway in CIDR form.
    pub gateway: String,
}

/// One container attachment on a network.
#[derive(Debug)]
pub struct Endpoint {
    /// Endpoint id assigned by the orchestrator.
    pub id: String,
    /// Netdevice moved into the container on Join.
    pub dev_name: String,
    /// IPv4 address the caller assigned, if any.
    pub address: Option<String>,
    /// Sandbox the endpoint is bound to; `None` while unjoined.
    pub sandbox_key: Option<String>,
    /// VF held from the single-port pool.
    pub vf: Option<VfToken>,
    /// Child netdevice held from a dual-port pool.
    pub vf_name: Option<String>,
}

/// Reply to a successful Create-Endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEndpoint {
    /// The netdevice backing the endpoint.
    pub dev_name: String,
    /// The address assigned to the endpoint, if any.
    pub address: Option<String>,
}

/// Reply to a successful Join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    /// Host-side netdevice name handed to the sandbox.
    pub src_name: String,
    /// Interface-name prefix visible inside the container.
    pub dst_prefix: String,
    /// Bare gateway address (no prefix length).
    pub gateway: String,
}

/// Reply to EndpointInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDetails {
    /// Endpoint id.
    pub id: String,
    /// Host-side netdevice name.
    pub src_name: String,
}

/// Driver capabilities advertised to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Network scope; always node-local.
    pub scope: &'static str,
}

/// Scope value for node-local networks.
pub const LOCAL_SCOPE: &str = "local";

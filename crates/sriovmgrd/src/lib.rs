//! sriovmgrd - Docker network plugin daemon for SR-IOV and passthrough
//! netdevices.
//!
//! Provisions container network interfaces straight off a physical NIC's
//! virtual functions (or the physical device itself) instead of software
//! bridging, tracking the scarce hardware pool across restarts through an
//! on-disk config store.

mod commands;
mod driver;
mod dualport;
mod network;
mod options;
mod passthrough;
mod pool;
mod port_map;
mod rdma;
mod sriov;
mod store;
#[cfg(test)]
mod testutil;
mod types;

pub use driver::Driver;
pub use dualport::{DpPool, DualPortNetwork};
pub use network::{GenericNetwork, Network, NetworkVariant};
pub use options::NetworkOptions;
pub use passthrough::PassthroughNetwork;
pub use pool::{PfPool, PfState, VfToken};
pub use store::{ConfigStore, NetworkEntry, DEFAULT_CONFIG_ROOT};
pub use types::{
    Capabilities, CreatedEndpoint, Endpoint, EndpointDetails, IpamConfig, IpamRequest, JoinInfo,
    NetworkMode,
};

//! The network registry: owns every network and dispatches lifecycle calls.
//!
//! The registry serializes all lifecycle operations behind one lock held
//! by the caller (the plugin server wraps the driver in a single
//! `Arc<Mutex<_>>`), so methods take `&mut self` and run to completion.
//! PF state shared across networks lives in the pools owned here; nothing
//! is global.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use sriovmgr_common::{DriverError, DriverResult};
use sriovmgr_types::{Ipv4Net, MacAddress};

use crate::dualport::{self, DpPool, DualPortNetwork};
use crate::network::{GenericNetwork, Network, NetworkVariant};
use crate::options::{self, NetworkOptions};
use crate::passthrough::PassthroughNetwork;
use crate::pool::PfPool;
use crate::rdma;
use crate::sriov::SriovNetwork;
use crate::store::{ConfigStore, NetworkEntry, CONFIG_VERSION};
use crate::types::{
    Capabilities, CreatedEndpoint, Endpoint, EndpointDetails, IpamConfig, IpamRequest, JoinInfo,
    NetworkMode, LOCAL_SCOPE,
};

/// The driver registry.
pub struct Driver {
    /// Networks keyed by network id.
    networks: HashMap<String, Network>,
    /// Single-port SR-IOV device table.
    pf_pool: PfPool,
    /// Dual-port SR-IOV device table.
    dp_pool: DpPool,
    /// Persistence store.
    store: ConfigStore,
    /// Sysfs root for device discovery.
    sys_root: PathBuf,
    /// RDMA class root for the hop-limit workaround.
    rdma_root: PathBuf,
}

impl Driver {
    /// Creates a driver over the live sysfs tree.
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self::with_roots(
            sriovmgr_common::sysfs::DEFAULT_SYS_ROOT,
            rdma::DEFAULT_RDMA_ROOT,
            config_root,
        )
    }

    /// Creates a driver with explicit sysfs/RDMA roots.
    pub fn with_roots(
        sys_root: impl Into<PathBuf>,
        rdma_root: impl Into<PathBuf>,
        config_root: impl Into<PathBuf>,
    ) -> Self {
        let sys_root = sys_root.into();
        Driver {
            networks: HashMap::new(),
            pf_pool: PfPool::new(&sys_root),
            dp_pool: DpPool::new(&sys_root),
            store: ConfigStore::new(config_root),
            sys_root,
            rdma_root: rdma_root.into(),
        }
    }

    /// Creates a driver whose pools capture commands instead of running them.
    #[cfg(test)]
    pub fn new_mock(
        sys_root: &std::path::Path,
        rdma_root: &std::path::Path,
        config_root: &std::path::Path,
    ) -> Self {
        Driver {
            networks: HashMap::new(),
            pf_pool: PfPool::new(sys_root).with_mock_mode(),
            dp_pool: DpPool::new(sys_root).with_mock_mode(),
            store: ConfigStore::new(config_root),
            sys_root: sys_root.to_path_buf(),
            rdma_root: rdma_root.to_path_buf(),
        }
    }

    /// Advertises node-local scope; networks are never swarm-coordinated.
    pub fn get_capabilities(&self) -> Capabilities {
        Capabilities { scope: LOCAL_SCOPE }
    }

    /// Replays every persisted network into the registry.
    ///
    /// Individual replay failures are skipped: the orchestrator may have
    /// deleted networks while the daemon was down, and a device can have
    /// disappeared across the restart. A corrupt store still fails hard.
    pub async fn replay_persisted(&mut self) -> DriverResult<()> {
        let entries = self.store.read_all()?;
        info!("Replaying {} persisted network(s)", entries.len());
        for (network_id, entry) in entries {
            if let Err(e) = self.replay_one(&network_id, &entry).await {
                warn!("Skipping persisted network {}: {}", network_id, e);
            }
        }
        Ok(())
    }

    async fn replay_one(&mut self, network_id: &str, entry: &NetworkEntry) -> DriverResult<()> {
        let options = NetworkOptions::from_entry(entry)?;
        let gateway = entry
            .gateway
            .parse::<Ipv4Net>()
            .map_err(|e| DriverError::invalid_config("gateway", e.to_string()))?;
        let pool = if entry.subnet.is_empty() {
            None
        } else {
            Some(
                entry
                    .subnet
                    .parse::<Ipv4Net>()
                    .map_err(|e| DriverError::invalid_config("subnet", e.to_string()))?,
            )
        };

        // Persistence stays off for the replayed call; the entry we are
        // replaying is already on disk.
        self.create_network_with(network_id, options, IpamConfig { pool, gateway }, false)
            .await
    }

    /// Creates a network from a wire request.
    pub async fn create_network(
        &mut self,
        network_id: &str,
        options: &HashMap<String, String>,
        ipam: Option<&IpamRequest>,
    ) -> DriverResult<()> {
        debug!("CreateNetwork called for {}", network_id);

        let ipam = ipam
            .filter(|data| !data.gateway.is_empty())
            .ok_or_else(|| {
                DriverError::invalid_config("ipv4", "network gateway configuration missing")
            })?;

        let options = NetworkOptions::parse(options)?;
        let gateway = ipam
            .gateway
            .parse::<Ipv4Net>()
            .map_err(|e| DriverError::invalid_config("gateway", e.to_string()))?;
        let pool = match ipam.pool.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<Ipv4Net>()
                    .map_err(|e| DriverError::invalid_config("subnet", e.to_string()))?,
            ),
        };

        self.create_network_with(network_id, options, IpamConfig { pool, gateway }, true)
            .await
    }

    /// Shared creation path for wire requests and startup replay.
    async fn create_network_with(
        &mut self,
        network_id: &str,
        options: NetworkOptions,
        ipam: IpamConfig,
        persist: bool,
    ) -> DriverResult<()> {
        // Gateway uniqueness across every existing network, checked before
        // any device-specific setup.
        if self
            .networks
            .values()
            .any(|network| network.gen.ipam.gateway == ipam.gateway)
        {
            return Err(DriverError::GatewayConflict {
                gateway: ipam.gateway.to_string(),
            });
        }

        // Networks sharing a device must use distinct VLANs.
        if options.mode == NetworkMode::Sriov && !options.vlan.is_untagged() {
            let clash = self.networks.values().any(|network| {
                network.gen.ndev_name == options.netdevice && network.vlan() == options.vlan
            });
            if clash {
                return Err(DriverError::VlanConflict {
                    device: options.netdevice.clone(),
                    vlan: options.vlan.as_u16(),
                });
            }
        }

        let variant = match options.mode {
            NetworkMode::Passthrough => NetworkVariant::Passthrough(PassthroughNetwork::create()),
            NetworkMode::Sriov => {
                if dualport::is_dual_port_device(&self.sys_root, &options.netdevice) {
                    if !options.vlan.is_untagged() {
                        return Err(DriverError::invalid_config(
                            options::OPT_VLAN,
                            "vlan is not supported on dual-port devices",
                        ));
                    }
                    NetworkVariant::DualPort(
                        DualPortNetwork::create(&mut self.dp_pool, &options).await?,
                    )
                } else {
                    NetworkVariant::Sriov(SriovNetwork::create(&mut self.pf_pool, &options).await?)
                }
            }
        };

        let entry = persist.then(|| NetworkEntry {
            version: CONFIG_VERSION,
            netdevice: options.netdevice.clone(),
            mode: options.mode.as_str().to_string(),
            subnet: ipam.pool.map(|pool| pool.to_string()).unwrap_or_default(),
            gateway: ipam.gateway.to_string(),
            vlan: options.vlan.as_u16(),
            privileged: options.privileged,
        });

        let network = Network {
            gen: GenericNetwork::new(network_id, &options, ipam),
            variant,
        };
        info!(
            "Created {} network {} on {} (gateway {})",
            network.variant_label(),
            network_id,
            network.gen.ndev_name,
            network.gen.ipam.gateway
        );
        self.networks.insert(network_id.to_string(), network);

        if let Some(entry) = entry {
            if let Err(e) = self.store.write(network_id, &entry) {
                // No partial commit: undo the insertion and the PF
                // reference taken above.
                self.rollback_create(network_id);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undoes a creation whose late steps failed.
    fn rollback_create(&mut self, network_id: &str) {
        if let Some(network) = self.networks.remove(network_id) {
            match &network.variant {
                NetworkVariant::Passthrough(_) => {}
                NetworkVariant::Sriov(nw) => {
                    nw.delete_network(&mut self.pf_pool, &network.gen.ndev_name)
                }
                NetworkVariant::DualPort(nw) => {
                    nw.delete_network(&mut self.dp_pool, &network.gen.ndev_name)
                }
            }
            warn!("Rolled back creation of network {}", network_id);
        }
    }

    /// Deletes a network; deleting an unknown id is not an error.
    pub async fn delete_network(&mut self, network_id: &str) -> DriverResult<()> {
        match self.networks.remove(network_id) {
            Some(mut network) => {
                // Tear down anything the orchestrator left behind so held
                // VFs return to their pool before the PF reference drops.
                let leftover: Vec<String> = network.gen.endpoints.keys().cloned().collect();
                for endpoint_id in leftover {
                    if let Some(endpoint) = network.gen.endpoints.remove(&endpoint_id) {
                        warn!(
                            "Network {} deleted with live endpoint {}",
                            network_id, endpoint_id
                        );
                        Self::release_endpoint(
                            &mut self.pf_pool,
                            &mut self.dp_pool,
                            &network,
                            endpoint,
                        );
                    }
                }

                match &network.variant {
                    NetworkVariant::Passthrough(_) => {}
                    NetworkVariant::Sriov(nw) => {
                        nw.delete_network(&mut self.pf_pool, &network.gen.ndev_name)
                    }
                    NetworkVariant::DualPort(nw) => {
                        nw.delete_network(&mut self.dp_pool, &network.gen.ndev_name)
                    }
                }
                info!(
                    "Deleted network {} ({} remaining)",
                    network_id,
                    self.networks.len()
                );
            }
            None => debug!("DeleteNetwork on unknown network {}", network_id),
        }

        // Remove the persisted entry exactly once, for every variant.
        self.store.delete(network_id)
    }

    /// Creates an endpoint, consuming one VF (or the passthrough device).
    pub async fn create_endpoint(
        &mut self,
        network_id: &str,
        endpoint_id: &str,
        address: Option<&str>,
        mac_address: Option<&str>,
    ) -> DriverResult<CreatedEndpoint> {
        debug!(
            "CreateEndpoint called for {} on network {}",
            endpoint_id, network_id
        );

        let requested_mac = match mac_address {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<MacAddress>()
                    .map_err(|e| DriverError::invalid_config("mac", e.to_string()))?,
            ),
        };

        let network = self
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        if network.gen.endpoints.contains_key(endpoint_id) {
            return Err(DriverError::internal(format!(
                "endpoint '{}' already exists",
                endpoint_id
            )));
        }

        let address = address.filter(|raw| !raw.is_empty()).map(str::to_string);
        let endpoint = match &network.variant {
            NetworkVariant::Passthrough(pt) => {
                pt.create_endpoint(&network.gen, endpoint_id, address)?
            }
            NetworkVariant::Sriov(nw) => {
                nw.create_endpoint(
                    &mut self.pf_pool,
                    &self.rdma_root,
                    &network.gen,
                    endpoint_id,
                    address,
                    requested_mac.as_ref(),
                )
                .await?
            }
            NetworkVariant::DualPort(nw) => {
                nw.create_endpoint(&mut self.dp_pool, &network.gen, endpoint_id, address)
                    .await?
            }
        };

        let reply = CreatedEndpoint {
            dev_name: endpoint.dev_name.clone(),
            address: endpoint.address.clone(),
        };
        network
            .gen
            .endpoints
            .insert(endpoint_id.to_string(), endpoint);
        Ok(reply)
    }

    /// Deletes an endpoint, releasing any VF it held.
    pub async fn delete_endpoint(
        &mut self,
        network_id: &str,
        endpoint_id: &str,
    ) -> DriverResult<()> {
        debug!(
            "DeleteEndpoint called for {} on network {}",
            endpoint_id, network_id
        );

        let network = self
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let endpoint = network.gen.endpoints.remove(endpoint_id).ok_or_else(|| {
            DriverError::EndpointNotFound {
                id: endpoint_id.to_string(),
            }
        })?;

        Self::release_endpoint(&mut self.pf_pool, &mut self.dp_pool, network, endpoint);
        Ok(())
    }

    fn release_endpoint(
        pf_pool: &mut PfPool,
        dp_pool: &mut DpPool,
        network: &Network,
        endpoint: Endpoint,
    ) {
        match &network.variant {
            NetworkVariant::Passthrough(_) => {}
            NetworkVariant::Sriov(nw) => {
                nw.delete_endpoint(pf_pool, &network.gen.ndev_name, endpoint)
            }
            NetworkVariant::DualPort(nw) => {
                nw.delete_endpoint(dp_pool, &network.gen.ndev_name, endpoint)
            }
        }
    }

    /// Binds an endpoint to a container sandbox.
    pub fn join(
        &mut self,
        network_id: &str,
        endpoint_id: &str,
        sandbox_key: &str,
    ) -> DriverResult<JoinInfo> {
        debug!("Join called for {} on network {}", endpoint_id, network_id);

        let network = self
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let endpoint = network.gen.endpoints.get_mut(endpoint_id).ok_or_else(|| {
            DriverError::EndpointNotFound {
                id: endpoint_id.to_string(),
            }
        })?;

        if let Some(bound) = &endpoint.sandbox_key {
            return Err(DriverError::EndpointInUse {
                id: endpoint_id.to_string(),
                sandbox_key: bound.clone(),
            });
        }
        endpoint.sandbox_key = Some(sandbox_key.to_string());

        Ok(JoinInfo {
            src_name: endpoint.dev_name.clone(),
            dst_prefix: network.gen.eth_prefix.clone(),
            gateway: network.gen.ipam.gateway.addr().to_string(),
        })
    }

    /// Unbinds an endpoint from its sandbox.
    pub fn leave(&mut self, network_id: &str, endpoint_id: &str) -> DriverResult<()> {
        debug!("Leave called for {} on network {}", endpoint_id, network_id);

        let network = self
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let endpoint = network.gen.endpoints.get_mut(endpoint_id).ok_or_else(|| {
            DriverError::EndpointNotFound {
                id: endpoint_id.to_string(),
            }
        })?;

        endpoint.sandbox_key = None;
        Ok(())
    }

    /// Reports an endpoint's id and host device.
    pub fn endpoint_info(
        &self,
        network_id: &str,
        endpoint_id: &str,
    ) -> DriverResult<EndpointDetails> {
        let network =
            self.networks
                .get(network_id)
                .ok_or_else(|| DriverError::NetworkNotFound {
                    id: network_id.to_string(),
                })?;
        let endpoint = network.gen.endpoints.get(endpoint_id).ok_or_else(|| {
            DriverError::EndpointNotFound {
                id: endpoint_id.to_string(),
            }
        })?;

        Ok(EndpointDetails {
            id: endpoint.id.clone(),
            src_name: endpoint.dev_name.clone(),
        })
    }

    /// Swarm-scope allocation is unsupported; accepted and ignored.
    pub fn allocate_network(&mut self, network_id: &str) {
        debug!("AllocateNetwork called for {} (ignored)", network_id);
    }

    /// Swarm-scope release is unsupported; accepted and ignored.
    pub fn free_network(&mut self, network_id: &str) {
        debug!("FreeNetwork called for {} (ignored)", network_id);
    }

    /// Multi-host discovery is unsupported; accepted and ignored.
    pub fn discover_new(&mut self) {
        debug!("DiscoverNew called (ignored)");
    }

    /// Multi-host discovery is unsupported; accepted and ignored.
    pub fn discover_delete(&mut self) {
        debug!("DiscoverDelete called (ignored)");
    }

    /// External routing is not programmed; accepted and ignored.
    pub fn program_external_connectivity(&mut self, network_id: &str, endpoint_id: &str) {
        debug!(
            "ProgramExternalConnectivity called for {}/{} (ignored)",
            network_id, endpoint_id
        );
    }

    /// External routing is not programmed; accepted and ignored.
    pub fn revoke_external_connectivity(&mut self, network_id: &str, endpoint_id: &str) {
        debug!(
            "RevokeExternalConnectivity called for {}/{} (ignored)",
            network_id, endpoint_id
        );
    }

    /// Number of registered networks.
    pub fn network_count(&self) -> usize {
        self.networks.len()
    }
}

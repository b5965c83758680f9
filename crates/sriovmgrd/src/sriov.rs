//! Single-port SR-IOV network variant.

use std::path::Path;

use tracing::info;

use sriovmgr_common::DriverResult;
use sriovmgr_types::{MacAddress, VlanTag};

use crate::network::GenericNetwork;
use crate::options::NetworkOptions;
use crate::pool::PfPool;
use crate::rdma;
use crate::types::Endpoint;

/// Single-port SR-IOV network variant.
///
/// Multiple VLAN-segregated networks share one PF's VF pool; the pool's
/// reference counting decides when SR-IOV is actually enabled and
/// disabled on the device.
#[derive(Debug)]
pub struct SriovNetwork {
    /// VLAN applied to every VF allocated for this network.
    pub vlan: VlanTag,
    /// Endpoints get trusted VFs with spoof checking off.
    pub privileged: bool,
    /// RoCE hop-limit override for allocated VFs.
    pub roce_hop_limit: Option<u8>,
}

impl SriovNetwork {
    /// Brings the PF up, enables SR-IOV if needed, and takes a reference.
    pub async fn create(pool: &mut PfPool, options: &NetworkOptions) -> DriverResult<Self> {
        pool.set_link_up(&options.netdevice).await?;
        pool.acquire(&options.netdevice).await?;

        Ok(SriovNetwork {
            vlan: options.vlan,
            privileged: options.privileged,
            roce_hop_limit: options.roce_hop_limit,
        })
    }

    /// Allocates and configures a VF for a new endpoint.
    pub async fn create_endpoint(
        &self,
        pool: &mut PfPool,
        rdma_root: &Path,
        gen: &GenericNetwork,
        endpoint_id: &str,
        address: Option<String>,
        requested_mac: Option<&MacAddress>,
    ) -> DriverResult<Endpoint> {
        let (token, vf_netdev) = pool
            .alloc(&gen.ndev_name, requested_mac, self.vlan, self.privileged)
            .await?;

        if let Some(hop_limit) = self.roce_hop_limit {
            let sys_root = pool.sys_root().to_path_buf();
            if let Err(e) = rdma::set_hop_limit(rdma_root, &sys_root, &vf_netdev, hop_limit) {
                pool.free(&gen.ndev_name, token);
                return Err(e);
            }
        }

        info!(
            "Endpoint {} on network {} gets VF {} ({})",
            endpoint_id,
            gen.id,
            token.index(),
            vf_netdev
        );
        Ok(Endpoint {
            id: endpoint_id.to_string(),
            dev_name: vf_netdev,
            address,
            sandbox_key: None,
            vf: Some(token),
            vf_name: None,
        })
    }

    /// Returns the endpoint's VF to the pool.
    pub fn delete_endpoint(&self, pool: &mut PfPool, ndev_name: &str, endpoint: Endpoint) {
        if let Some(token) = endpoint.vf {
            pool.free(ndev_name, token);
        }
    }

    /// Drops the network's reference on the PF; the last network disables
    /// SR-IOV on the device.
    pub fn delete_network(&self, pool: &mut PfPool, ndev_name: &str) {
        pool.release(ndev_name);
    }
}

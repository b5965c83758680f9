//! Dual-port SR-IOV: pool and network variant.
//!
//! VFs of a multi-port ASIC are discovered through the port-mapping tool
//! instead of `virtfn*` enumeration, and the devices are assumed to be
//! correctly bound already, so allocation skips the unbind/rebind cycle.
//! VLAN segregation is not supported on this variant; creation requests
//! carrying a VLAN are rejected before any device state changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use sriovmgr_common::{shell, sysfs, DriverError, DriverResult};

use crate::commands::{
    build_link_up_cmd, build_vf_mac_cmd, build_vf_spoofchk_cmd, build_vf_trust_cmd,
};
use crate::network::GenericNetwork;
use crate::options::NetworkOptions;
use crate::port_map::{child_netdevs, find_phy_port, parse_port_map};
use crate::types::Endpoint;

/// Per-device state for a dual-port PF.
#[derive(Debug)]
struct DpPfDevice {
    child_netdevs: Vec<String>,
    max_child_dev: usize,
    ref_count: usize,
}

/// Table of dual-port physical devices and their child-netdevice pools.
pub struct DpPool {
    sys_root: PathBuf,
    devices: HashMap<String, DpPfDevice>,

    /// Mock mode for testing
    #[cfg(test)]
    mock_mode: bool,

    /// Captured commands in mock mode
    #[cfg(test)]
    captured_commands: Vec<String>,

    /// Canned port-mapping output in mock mode
    #[cfg(test)]
    mock_port_map: Option<String>,
}

impl DpPool {
    /// Creates an empty pool over the given sysfs root.
    pub fn new(sys_root: impl Into<PathBuf>) -> Self {
        DpPool {
            sys_root: sys_root.into(),
            devices: HashMap::new(),
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: Vec::new(),
            #[cfg(test)]
            mock_port_map: None,
        }
    }

    /// Enables mock mode for testing
    #[cfg(test)]
    pub fn with_mock_mode(mut self) -> Self {
        self.mock_mode = true;
        self
    }

    /// Injects port-mapping tool output (for testing)
    #[cfg(test)]
    pub fn set_mock_port_map(&mut self, output: &str) {
        self.mock_port_map = Some(output.to_string());
    }

    /// Gets captured commands (for testing)
    #[cfg(test)]
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }

    /// Execute a shell command (with mock mode support)
    async fn exec(&mut self, cmd: &str) -> DriverResult<()> {
        #[cfg(test)]
        if self.mock_mode {
            self.captured_commands.push(cmd.to_string());
            debug!("Mock exec: {}", cmd);
            return Ok(());
        }

        shell::exec_or_throw(cmd).await?;
        Ok(())
    }

    /// Brings a PF link up.
    pub async fn set_link_up(&mut self, netdev: &str) -> DriverResult<()> {
        self.exec(&build_link_up_cmd(netdev)).await
    }

    /// Returns true if the device advertises a nonzero maximum VF count.
    pub fn sriov_supported(&self, netdev: &str) -> bool {
        sysfs::max_vf_count(&self.sys_root, netdev)
            .map(|max| max > 0)
            .unwrap_or(false)
    }

    async fn port_map_output(&self) -> DriverResult<String> {
        #[cfg(test)]
        if let Some(output) = &self.mock_port_map {
            return Ok(output.clone());
        }

        shell::exec_or_throw(shell::IBDEV2NETDEV_CMD).await
    }

    /// Takes a reference on a device, discovering its child netdevices if
    /// this is the first network on it.
    pub async fn acquire(&mut self, netdev: &str) -> DriverResult<()> {
        if let Some(device) = self.devices.get_mut(netdev) {
            device.ref_count += 1;
            debug!(
                "Dual-port PF {} already discovered, ref count now {}",
                netdev, device.ref_count
            );
            return Ok(());
        }

        let output = self.port_map_output().await?;
        let map = parse_port_map(&output);
        let port = find_phy_port(&map, netdev)
            .filter(|port| *port > 0)
            .ok_or_else(|| {
                DriverError::internal(format!("no physical port found for {}", netdev))
            })?;

        let child_netdevs = child_netdevs(&map, netdev, port);
        if child_netdevs.is_empty() {
            return Err(DriverError::SriovUnsupported {
                device: netdev.to_string(),
            });
        }

        info!(
            "Discovered {} child netdevices on dual-port PF {} (port {})",
            child_netdevs.len(),
            netdev,
            port
        );
        self.devices.insert(
            netdev.to_string(),
            DpPfDevice {
                max_child_dev: child_netdevs.len(),
                child_netdevs,
                ref_count: 1,
            },
        );
        Ok(())
    }

    /// Drops a network's reference; the last reference removes the device
    /// from the table. SR-IOV itself stays enabled on the kernel device.
    pub fn release(&mut self, netdev: &str) {
        let remove = match self.devices.get_mut(netdev) {
            Some(device) => {
                device.ref_count = device.ref_count.saturating_sub(1);
                device.ref_count == 0
            }
            None => {
                warn!("Release on untracked dual-port PF {}", netdev);
                false
            }
        };
        if remove {
            self.devices.remove(netdev);
            info!("Forgot dual-port PF {}", netdev);
        }
    }

    /// Allocates one child netdevice and applies its attributes.
    ///
    /// The candidate stays in the pool until every hard attribute step
    /// succeeded, so a failed allocation leaves the pool unchanged.
    pub async fn alloc(&mut self, netdev: &str, privileged: bool) -> DriverResult<String> {
        let sys_root = self.sys_root.clone();

        let candidate = self
            .devices
            .get(netdev)
            .and_then(|device| device.child_netdevs.last().cloned())
            .ok_or_else(|| DriverError::PoolExhausted {
                device: netdev.to_string(),
            })?;

        let vf_dir = sysfs::find_vf_dir_for_netdev(&sys_root, netdev, &candidate)?.ok_or_else(
            || DriverError::internal(format!("no virtfn entry backs {}", candidate)),
        )?;
        let vf_index = vf_dir
            .strip_prefix(sysfs::VF_DEVICE_PREFIX)
            .and_then(|raw| raw.parse::<u32>().ok())
            .ok_or_else(|| {
                DriverError::internal(format!("malformed VF directory name {}", vf_dir))
            })?;

        // Program the child's current address as its administrative default.
        let mac = sysfs::netdev_mac(&sys_root, &candidate)?;
        self.exec(&build_vf_mac_cmd(netdev, vf_index, &mac)).await?;

        // Best effort: older kernels reject these knobs.
        let (trusted, spoof_checked) = if privileged {
            (true, false)
        } else {
            (false, true)
        };
        if let Err(e) = self
            .exec(&build_vf_trust_cmd(netdev, vf_index, trusted))
            .await
        {
            warn!("Failed to set trust on {} vf {}: {}", netdev, vf_index, e);
        }
        if let Err(e) = self
            .exec(&build_vf_spoofchk_cmd(netdev, vf_index, spoof_checked))
            .await
        {
            warn!("Failed to set spoofchk on {} vf {}: {}", netdev, vf_index, e);
        }

        if let Some(device) = self.devices.get_mut(netdev) {
            device.child_netdevs.pop();
            info!(
                "Allocated {} on dual-port PF {} ({} left)",
                candidate,
                netdev,
                device.child_netdevs.len()
            );
        }
        Ok(candidate)
    }

    /// Returns a child netdevice to the free pool.
    pub fn free(&mut self, netdev: &str, vf_name: String) {
        match self.devices.get_mut(netdev) {
            Some(device) => {
                debug!("Freed {} on dual-port PF {}", vf_name, netdev);
                device.child_netdevs.push(vf_name);
            }
            None => warn!("Dropping {} for untracked dual-port PF {}", vf_name, netdev),
        }
    }

    /// Returns true if the device is tracked by the pool.
    pub fn contains(&self, netdev: &str) -> bool {
        self.devices.contains_key(netdev)
    }

    /// Number of networks referencing the device.
    pub fn ref_count(&self, netdev: &str) -> usize {
        self.devices
            .get(netdev)
            .map(|device| device.ref_count)
            .unwrap_or(0)
    }

    /// Number of free child netdevices on the device.
    pub fn free_count(&self, netdev: &str) -> usize {
        self.devices
            .get(netdev)
            .map(|device| device.child_netdevs.len())
            .unwrap_or(0)
    }

    /// Number of child netdevices discovered on the device.
    pub fn max_child_dev(&self, netdev: &str) -> usize {
        self.devices
            .get(netdev)
            .map(|device| device.max_child_dev)
            .unwrap_or(0)
    }
}

/// Dual-port SR-IOV network variant.
#[derive(Debug)]
pub struct DualPortNetwork {
    /// Endpoints get trusted VFs with spoof checking off.
    pub privileged: bool,
}

impl DualPortNetwork {
    /// Brings the PF up, discovers its children, and takes a reference.
    pub async fn create(pool: &mut DpPool, options: &NetworkOptions) -> DriverResult<Self> {
        if !pool.sriov_supported(&options.netdevice) {
            return Err(DriverError::SriovUnsupported {
                device: options.netdevice.clone(),
            });
        }

        pool.set_link_up(&options.netdevice).await?;
        pool.acquire(&options.netdevice).await?;

        Ok(DualPortNetwork {
            privileged: options.privileged,
        })
    }

    /// Allocates a child netdevice for a new endpoint.
    pub async fn create_endpoint(
        &self,
        pool: &mut DpPool,
        gen: &GenericNetwork,
        endpoint_id: &str,
        address: Option<String>,
    ) -> DriverResult<Endpoint> {
        let vf_name = pool.alloc(&gen.ndev_name, self.privileged).await?;

        Ok(Endpoint {
            id: endpoint_id.to_string(),
            dev_name: vf_name.clone(),
            address,
            sandbox_key: None,
            vf: None,
            vf_name: Some(vf_name),
        })
    }

    /// Returns the endpoint's child netdevice to the pool.
    pub fn delete_endpoint(&self, pool: &mut DpPool, ndev_name: &str, endpoint: Endpoint) {
        if let Some(vf_name) = endpoint.vf_name {
            pool.free(ndev_name, vf_name);
        }
    }

    /// Drops the network's reference on the PF.
    pub fn delete_network(&self, pool: &mut DpPool, ndev_name: &str) {
        pool.release(ndev_name);
    }
}

/// Returns true if the netdevice is one port of a multi-port device.
pub fn is_dual_port_device(sys_root: &Path, netdev: &str) -> bool {
    sysfs::is_multiport_device(sys_root, netdev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_pf, make_sibling_port, make_vf};
    use tempfile::TempDir;

    const PORT_MAP: &str = "\
mlx5_0 port 1 ==> ens2f0 (Up)
mlx5_1 port 1 ==> ens2f0v0 (Up)
mlx5_2 port 1 ==> ens2f0v1 (Up)
mlx5_3 port 2 ==> ens2f1 (Up)
";

    /// ens2f0 is a dual-port PF with two allocatable children backed by
    /// virtfn0/virtfn1.
    fn dp_fixture() -> (TempDir, DpPool) {
        let tmp = TempDir::new().unwrap();
        make_pf(tmp.path(), "ens2f0", "0000:05:00.0", 4);
        make_sibling_port(tmp.path(), "ens2f0", "ens2f1");
        make_vf(tmp.path(), "ens2f0", 0, "0000:05:00.1", "ens2f0v0");
        make_vf(tmp.path(), "ens2f0", 1, "0000:05:00.2", "ens2f0v1");

        let mut pool = DpPool::new(tmp.path()).with_mock_mode();
        pool.set_mock_port_map(PORT_MAP);
        (tmp, pool)
    }

    #[tokio::test]
    async fn test_acquire_discovers_children() {
        let (_tmp, mut pool) = dp_fixture();

        pool.acquire("ens2f0").await.unwrap();
        assert_eq!(pool.ref_count("ens2f0"), 1);
        assert_eq!(pool.free_count("ens2f0"), 2);
        assert_eq!(pool.max_child_dev("ens2f0"), 2);
    }

    #[tokio::test]
    async fn test_acquire_unknown_port() {
        let (_tmp, mut pool) = dp_fixture();

        let err = pool.acquire("eth7").await.unwrap_err();
        assert!(err.to_string().contains("no physical port"));
    }

    #[tokio::test]
    async fn test_alloc_pops_last_child() {
        let (_tmp, mut pool) = dp_fixture();
        pool.acquire("ens2f0").await.unwrap();

        let name = pool.alloc("ens2f0", false).await.unwrap();
        assert_eq!(name, "ens2f0v1");
        assert_eq!(pool.free_count("ens2f0"), 1);

        // The MAC programming targeted virtfn1.
        let cmds = pool.captured_commands();
        assert!(cmds.iter().any(|c| c.contains("vf 1") && c.contains("mac")));
        // No bind cycling and no VLAN on this variant.
        assert!(!cmds.iter().any(|c| c.contains(" vlan ")));
    }

    #[tokio::test]
    async fn test_alloc_exhaustion() {
        let (_tmp, mut pool) = dp_fixture();
        pool.acquire("ens2f0").await.unwrap();

        pool.alloc("ens2f0", false).await.unwrap();
        pool.alloc("ens2f0", false).await.unwrap();
        let err = pool.alloc("ens2f0", false).await.unwrap_err();
        assert!(matches!(err, DriverError::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn test_free_and_realloc() {
        let (_tmp, mut pool) = dp_fixture();
        pool.acquire("ens2f0").await.unwrap();

        let name = pool.alloc("ens2f0", false).await.unwrap();
        pool.free("ens2f0", name.clone());
        assert_eq!(pool.free_count("ens2f0"), 2);

        let again = pool.alloc("ens2f0", false).await.unwrap();
        assert_eq!(again, name);
    }

    #[tokio::test]
    async fn test_release_keeps_sriov_enabled() {
        let (_tmp, mut pool) = dp_fixture();
        pool.acquire("ens2f0").await.unwrap();
        pool.acquire("ens2f0").await.unwrap();

        pool.release("ens2f0");
        assert!(pool.contains("ens2f0"));
        pool.release("ens2f0");
        assert!(!pool.contains("ens2f0"));
    }
}

//! PF/VF pool and state machine for sysfs-enumerated SR-IOV devices.
//!
//! One [`PfDevice`] exists per physical device, shared by every network
//! bound to it. The device is enabled (SR-IOV turned on, VF list
//! discovered) when the first network acquires it and disabled when the
//! last one releases it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use sriovmgr_common::{shell, sysfs, DriverError, DriverResult};
use sriovmgr_types::{MacAddress, VlanTag};

use crate::commands::{
    build_link_up_cmd, build_vf_mac_cmd, build_vf_spoofchk_cmd, build_vf_trust_cmd,
    build_vf_vlan_cmd,
};

/// Exclusive handle on one virtual function.
///
/// Tokens are owned by the pool and move out on allocation; there is no
/// `Clone`, so an endpoint can neither duplicate its VF nor return it
/// twice.
#[derive(Debug, PartialEq, Eq)]
pub struct VfToken {
    index: u32,
}

impl VfToken {
    fn new(index: u32) -> Self {
        VfToken { index }
    }

    /// The VF index within its PF.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The `virtfnN` directory name for this VF.
    pub fn dir_name(&self) -> String {
        format!("{}{}", sysfs::VF_DEVICE_PREFIX, self.index)
    }
}

/// SR-IOV enablement state of a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfState {
    /// SR-IOV not enabled on the kernel device.
    Disabled,
    /// SR-IOV enabled, VF count configured, pool discovered.
    Enabled,
}

/// Per-device SR-IOV state.
#[derive(Debug)]
struct PfDevice {
    state: PfState,
    max_vf_count: u32,
    free_vfs: Vec<VfToken>,
    ref_count: usize,
}

/// Table of SR-IOV physical devices and their free-VF pools.
pub struct PfPool {
    sys_root: PathBuf,
    devices: HashMap<String, PfDevice>,

    /// Mock mode for testing
    #[cfg(test)]
    mock_mode: bool,

    /// Captured commands in mock mode
    #[cfg(test)]
    captured_commands: Vec<String>,
}

impl PfPool {
    /// Creates an empty pool over the given sysfs root.
    pub fn new(sys_root: impl Into<PathBuf>) -> Self {
        PfPool {
            sys_root: sys_root.into(),
            devices: HashMap::new(),
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: Vec::new(),
        }
    }

    /// Enables mock mode for testing
    #[cfg(test)]
    pub fn with_mock_mode(mut self) -> Self {
        self.mock_mode = true;
        self
    }

    /// Gets captured commands (for testing)
    #[cfg(test)]
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }

    /// The sysfs root this pool operates on.
    pub fn sys_root(&self) -> &Path {
        &self.sys_root
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

    /// Takes a reference on a device, enabling SR-IOV and discovering the
    /// VF pool if this is the first network on it.
    pub async fn acquire(&mut self, netdev: &str) -> DriverResult<()> {
        if let Some(device) = self.devices.get_mut(netdev) {
            device.ref_count += 1;
            debug!(
                "PF {} already enabled, ref count now {}",
                netdev, device.ref_count
            );
            return Ok(());
        }

        let mut device = self.init_device(netdev)?;
        device.ref_count = 1;
        self.devices.insert(netdev.to_string(), device);
        Ok(())
    }

    /// Disabled -> Enabled transition plus first-touch discovery.
    fn init_device(&self, netdev: &str) -> DriverResult<PfDevice> {
        if !sysfs::device_exists(&self.sys_root, netdev) {
            return Err(DriverError::DeviceNotFound {
                device: netdev.to_string(),
            });
        }

        let max_vf_count = sysfs::max_vf_count(&self.sys_root, netdev)?;
        if max_vf_count == 0 {
            return Err(DriverError::SriovUnsupported {
                device: netdev.to_string(),
            });
        }
        sysfs::set_vf_count(&self.sys_root, netdev, max_vf_count)?;

        let free_vfs: Vec<VfToken> = sysfs::list_vf_dirs(&self.sys_root, netdev)?
            .iter()
            .filter_map(|dir| dir.strip_prefix(sysfs::VF_DEVICE_PREFIX))
            .filter_map(|index| index.parse::<u32>().ok())
            .map(VfToken::new)
            .collect();

        info!(
            "Enabled SR-IOV on {}: max_vfs={} discovered={}",
            netdev,
            max_vf_count,
            free_vfs.len()
        );

        Ok(PfDevice {
            state: PfState::Enabled,
            max_vf_count,
            free_vfs,
            ref_count: 0,
        })
    }

    /// Drops a network's reference; the last reference disables SR-IOV and
    /// removes the device from the table.
    pub fn release(&mut self, netdev: &str) {
        let disable = match self.devices.get_mut(netdev) {
            Some(device) => {
                device.ref_count = device.ref_count.saturating_sub(1);
                device.ref_count == 0
            }
            None => {
                warn!("Release on untracked PF {}", netdev);
                false
            }
        };

        if disable {
            if let Err(e) = sysfs::set_vf_count(&self.sys_root, netdev, 0) {
                warn!("Failed to disable SR-IOV on {}: {}", netdev, e);
            }
            self.devices.remove(netdev);
            info!("Disabled SR-IOV on {}", netdev);
        }
    }

    /// Allocates one VF and applies its attributes.
    ///
    /// Without a requested MAC the most recently freed VF is taken; with
    /// one, the free list is scanned for a VF currently carrying that
    /// address. The VF gets its current MAC programmed as administrative
    /// default, the network VLAN (if any), and trust/spoof-check per the
    /// privileged flag, then goes through an unbind/rebind cycle so any
    /// rename rule applies. Returns the token and the VF's netdevice name
    /// as observed after the rebind.
    pub async fn alloc(
        &mut self,
        netdev: &str,
        requested_mac: Option<&MacAddress>,
        vlan: VlanTag,
        privileged: bool,
    ) -> DriverResult<(VfToken, String)> {
        let sys_root = self.sys_root.clone();

        let token = {
            let device = self
                .devices
                .get_mut(netdev)
                .filter(|device| device.state == PfState::Enabled)
                .ok_or_else(|| {
                    DriverError::internal(format!("SR-IOV not enabled on {}", netdev))
                })?;

            match requested_mac {
                None => device.free_vfs.pop().ok_or(DriverError::PoolExhausted {
                    device: netdev.to_string(),
                })?,
                Some(mac) => {
                    let position = find_vf_by_mac(&sys_root, netdev, &device.free_vfs, mac)?
                        .ok_or_else(|| DriverError::VfNotFound {
                            device: netdev.to_string(),
                            mac: mac.to_string(),
                        })?;
                    device.free_vfs.remove(position)
                }
            }
        };

        match self.configure_vf(netdev, &token, vlan, privileged).await {
            Ok(vf_netdev) => {
                info!(
                    "Allocated VF {} ({}) on PF {}",
                    token.index(),
                    vf_netdev,
                    netdev
                );
                Ok((token, vf_netdev))
            }
            Err(e) => {
                self.free(netdev, token);
                Err(e)
            }
        }
    }

    /// Applies MAC/VLAN/trust attributes and cycles the driver binding.
    async fn configure_vf(
        &mut self,
        netdev: &str,
        token: &VfToken,
        vlan: VlanTag,
        privileged: bool,
    ) -> DriverResult<String> {
        let sys_root = self.sys_root.clone();
        let vf_dir = token.dir_name();

        let vf_netdev = sysfs::vf_netdev_name(&sys_root, netdev, &vf_dir)?.ok_or_else(|| {
            DriverError::internal(format!("{}/{} exposes no netdevice", netdev, vf_dir))
        })?;

        // Make the VF's current address its administrative default so it
        // survives driver reloads inside the container.
        let mac = sysfs::netdev_mac(&sys_root, &vf_netdev)?;
        self.exec(&build_vf_mac_cmd(netdev, token.index(), &mac))
            .await?;

        if !vlan.is_untagged() {
            self.exec(&build_vf_vlan_cmd(netdev, token.index(), vlan.as_u16()))
                .await?;
        }

        // Best effort: older kernels reject these knobs.
        let (trusted, spoof_checked) = if privileged {
            (true, false)
        } else {
            (false, true)
        };
        if let Err(e) = self
            .exec(&build_vf_trust_cmd(netdev, token.index(), trusted))
            .await
        {
            warn!("Failed to set trust on {} vf {}: {}", netdev, token.index(), e);
        }
        if let Err(e) = self
            .exec(&build_vf_spoofchk_cmd(netdev, token.index(), spoof_checked))
            .await
        {
            warn!(
                "Failed to set spoofchk on {} vf {}: {}",
                netdev,
                token.index(),
                e
            );
        }

        // Cycle the driver binding so udev rename rules apply. The VF's
        // netdevice name can change here; re-read it, never reuse the
        // pre-rebind name.
        let vf_pci_dev = sysfs::vf_pci_dev_name(&sys_root, netdev, &vf_dir)?;
        sysfs::unbind_vf(&sys_root, netdev, &vf_pci_dev)?;
        sysfs::bind_vf(&sys_root, netdev, &vf_pci_dev)?;

        sysfs::vf_netdev_name(&sys_root, netdev, &vf_dir)?.ok_or_else(|| {
            DriverError::internal(format!(
                "{}/{} exposes no netdevice after rebind",
                netdev, vf_dir
            ))
        })
    }

    /// Returns a VF to the free pool.
    ///
    /// No attribute reset happens here; the next allocation re-applies
    /// every attribute.
    pub fn free(&mut self, netdev: &str, token: VfToken) {
        match self.devices.get_mut(netdev) {
            Some(device) => {
                debug!("Freed VF {} on PF {}", token.index(), netdev);
                device.free_vfs.push(token);
            }
            None => warn!(
                "Dropping VF {} for untracked PF {}",
                token.index(),
                netdev
            ),
        }
    }

    /// Returns true if the device is tracked by the pool.
    pub fn contains(&self, netdev: &str) -> bool {
        self.devices.contains_key(netdev)
    }

    /// Returns true if the device is tracked and enabled.
    pub fn is_enabled(&self, netdev: &str) -> bool {
        self.devices
            .get(netdev)
            .map(|device| device.state == PfState::Enabled)
            .unwrap_or(false)
    }

    /// Number of networks referencing the device.
    pub fn ref_count(&self, netdev: &str) -> usize {
        self.devices
            .get(netdev)
            .map(|device| device.ref_count)
            .unwrap_or(0)
    }

    /// Number of free VFs on the device.
    pub fn free_vf_count(&self, netdev: &str) -> usize {
        self.devices
            .get(netdev)
            .map(|device| device.free_vfs.len())
            .unwrap_or(0)
    }

    /// Discovered maximum VF count of the device.
    pub fn max_vf_count(&self, netdev: &str) -> u32 {
        self.devices
            .get(netdev)
            .map(|device| device.max_vf_count)
            .unwrap_or(0)
    }
}

/// Scans the free list for a VF whose netdevice currently carries `mac`.
fn find_vf_by_mac(
    sys_root: &Path,
    netdev: &str,
    free_vfs: &[VfToken],
    mac: &MacAddress,
) -> DriverResult<Option<usize>> {
    for (position, token) in free_vfs.iter().enumerate() {
        let vf_netdev = match sysfs::vf_netdev_name(sys_root, netdev, &token.dir_name())? {
            Some(name) => name,
            None => continue,
        };
        let current = match sysfs::netdev_mac(sys_root, &vf_netdev)?.parse::<MacAddress>() {
            Ok(current) => current,
            Err(_) => continue,
        };
        if current == *mac {
            return Ok(Some(position));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_pf, make_vf};
    use sriovmgr_common::sysfs::{device_dir, read_int, CUR_VF_COUNT_FILE};
    use tempfile::TempDir;

    fn pool_with_pf(vf_count: u32) -> (TempDir, PfPool) {
        let tmp = TempDir::new().unwrap();
        make_pf(tmp.path(), "eth1", "0000:03:00.0", vf_count);
        for index in 0..vf_count {
            make_vf(
                tmp.path(),
                "eth1",
                index,
                &format!("0000:03:00.{}", index + 1),
                &format!("eth1v{}", index),
            );
        }
        let pool = PfPool::new(tmp.path()).with_mock_mode();
        (tmp, pool)
    }

    #[tokio::test]
    async fn test_acquire_enables_and_discovers() {
        let (tmp, mut pool) = pool_with_pf(4);

        pool.acquire("eth1").await.unwrap();
        assert!(pool.is_enabled("eth1"));
        assert_eq!(pool.ref_count("eth1"), 1);
        assert_eq!(pool.free_vf_count("eth1"), 4);
        assert_eq!(pool.max_vf_count("eth1"), 4);

        // The kernel saw the VF count write.
        let cur = read_int(&device_dir(tmp.path(), "eth1").join(CUR_VF_COUNT_FILE)).unwrap();
        assert_eq!(cur, 4);
    }

    #[tokio::test]
    async fn test_acquire_is_refcounted() {
        let (_tmp, mut pool) = pool_with_pf(2);

        pool.acquire("eth1").await.unwrap();
        pool.acquire("eth1").await.unwrap();
        assert_eq!(pool.ref_count("eth1"), 2);

        pool.release("eth1");
        assert!(pool.is_enabled("eth1"));

        pool.release("eth1");
        assert!(!pool.contains("eth1"));
    }

    #[tokio::test]
    async fn test_release_writes_zero_vf_count() {
        let (tmp, mut pool) = pool_with_pf(2);
        pool.acquire("eth1").await.unwrap();
        pool.release("eth1");

        let cur = read_int(&device_dir(tmp.path(), "eth1").join(CUR_VF_COUNT_FILE)).unwrap();
        assert_eq!(cur, 0);
    }

    #[tokio::test]
    async fn test_zero_max_vfs_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        make_pf(tmp.path(), "eth1", "0000:03:00.0", 0);
        let mut pool = PfPool::new(tmp.path()).with_mock_mode();

        let err = pool.acquire("eth1").await.unwrap_err();
        assert!(matches!(err, DriverError::SriovUnsupported { .. }));
        assert!(!pool.contains("eth1"));
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let tmp = TempDir::new().unwrap();
        let mut pool = PfPool::new(tmp.path()).with_mock_mode();

        let err = pool.acquire("eth9").await.unwrap_err();
        assert!(matches!(err, DriverError::DeviceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_alloc_is_lifo() {
        let (_tmp, mut pool) = pool_with_pf(4);
        pool.acquire("eth1").await.unwrap();

        let (token, vf_netdev) = pool
            .alloc("eth1", None, VlanTag::UNTAGGED, false)
            .await
            .unwrap();
        assert_eq!(token.index(), 3);
        assert_eq!(vf_netdev, "eth1v3");
        assert_eq!(pool.free_vf_count("eth1"), 3);
    }

    #[tokio::test]
    async fn test_alloc_applies_attributes() {
        let (_tmp, mut pool) = pool_with_pf(2);
        pool.acquire("eth1").await.unwrap();

        let (token, _) = pool
            .alloc("eth1", None, VlanTag::new(10).unwrap(), true)
            .await
            .unwrap();
        assert_eq!(token.index(), 1);

        let cmds = pool.captured_commands();
        assert!(cmds.iter().any(|c| c.contains("vf 1") && c.contains("mac")));
        assert!(cmds.iter().any(|c| c.contains("vf 1 vlan 10")));
        assert!(cmds.iter().any(|c| c.ends_with("trust on")));
        assert!(cmds.iter().any(|c| c.ends_with("spoofchk off")));
    }

    #[tokio::test]
    async fn test_alloc_untagged_skips_vlan() {
        let (_tmp, mut pool) = pool_with_pf(1);
        pool.acquire("eth1").await.unwrap();

        pool.alloc("eth1", None, VlanTag::UNTAGGED, false)
            .await
            .unwrap();

        let cmds = pool.captured_commands();
        assert!(!cmds.iter().any(|c| c.contains(" vlan ")));
        assert!(cmds.iter().any(|c| c.ends_with("trust off")));
        assert!(cmds.iter().any(|c| c.ends_with("spoofchk on")));
    }

    #[tokio::test]
    async fn test_alloc_exhaustion() {
        let (_tmp, mut pool) = pool_with_pf(2);
        pool.acquire("eth1").await.unwrap();

        let mut held = Vec::new();
        for _ in 0..2 {
            let (token, _) = pool
                .alloc("eth1", None, VlanTag::UNTAGGED, false)
                .await
                .unwrap();
            held.push(token);
        }

        let err = pool
            .alloc("eth1", None, VlanTag::UNTAGGED, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::PoolExhausted { .. }));
        assert!(err.is_capacity());
    }

    #[tokio::test]
    async fn test_free_returns_vf() {
        let (_tmp, mut pool) = pool_with_pf(2);
        pool.acquire("eth1").await.unwrap();

        let (token, _) = pool
            .alloc("eth1", None, VlanTag::UNTAGGED, false)
            .await
            .unwrap();
        assert_eq!(pool.free_vf_count("eth1"), 1);

        pool.free("eth1", token);
        assert_eq!(pool.free_vf_count("eth1"), 2);

        // The freed VF is the next one handed out.
        let (token, _) = pool
            .alloc("eth1", None, VlanTag::UNTAGGED, false)
            .await
            .unwrap();
        assert_eq!(token.index(), 1);
    }

    #[tokio::test]
    async fn test_alloc_by_mac() {
        let (_tmp, mut pool) = pool_with_pf(4);
        pool.acquire("eth1").await.unwrap();

        // The fixture gives eth1v2 the address aa:bb:cc:00:01:02.
        let mac: MacAddress = "aa:bb:cc:00:01:02".parse().unwrap();
        let (token, vf_netdev) = pool
            .alloc("eth1", Some(&mac), VlanTag::UNTAGGED, false)
            .await
            .unwrap();
        assert_eq!(token.index(), 2);
        assert_eq!(vf_netdev, "eth1v2");
        assert_eq!(pool.free_vf_count("eth1"), 3);
    }

    #[tokio::test]
    async fn test_alloc_by_unknown_mac() {
        let (_tmp, mut pool) = pool_with_pf(2);
        pool.acquire("eth1").await.unwrap();

        let mac: MacAddress = "de:ad:be:ef:00:01".parse().unwrap();
        let err = pool
            .alloc("eth1", Some(&mac), VlanTag::UNTAGGED, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::VfNotFound { .. }));
        assert_eq!(pool.free_vf_count("eth1"), 2);
    }

    #[tokio::test]
    async fn test_vf_conservation() {
        let (_tmp, mut pool) = pool_with_pf(4);
        pool.acquire("eth1").await.unwrap();

        let mut held = Vec::new();
        for _ in 0..3 {
            let (token, _) = pool
                .alloc("eth1", None, VlanTag::UNTAGGED, false)
                .await
                .unwrap();
            held.push(token);
        }
        assert_eq!(pool.free_vf_count("eth1") + held.len(), 4);

        for token in held.drain(..) {
            pool.free("eth1", token);
        }
        assert_eq!(pool.free_vf_count("eth1"), 4);
    }
}

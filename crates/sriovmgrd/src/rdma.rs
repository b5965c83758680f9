//! RoCE hop-limit workaround for RDMA-capable VFs.
//!
//! Routed RoCE deployments need the RDMA device's `ttl` attribute raised
//! above the kernel default. The RDMA device belonging to a netdevice is
//! found by matching the PCI `device` link of each entry under the RDMA
//! class directory against the netdevice's own.

use std::fs;
use std::path::Path;

use sriovmgr_common::{sysfs, DriverError, DriverResult};

/// Default RDMA class directory.
pub const DEFAULT_RDMA_ROOT: &str = "/sys/class/infiniband";

/// Resolves the RDMA device backing a netdevice, if any.
pub fn rdma_device_for_netdev(
    rdma_root: &Path,
    sys_root: &Path,
    netdev: &str,
) -> DriverResult<Option<String>> {
    let netdev_link = sys_root.join(netdev).join("device");
    let netdev_target =
        fs::read_link(&netdev_link).map_err(|e| DriverError::sysfs(&netdev_link, e))?;

    let entries = match fs::read_dir(rdma_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DriverError::sysfs(rdma_root, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| DriverError::sysfs(rdma_root, e))?;
        if let Ok(target) = fs::read_link(entry.path().join("device")) {
            if target == netdev_target {
                return Ok(Some(entry.file_name().to_string_lossy().into_owned()));
            }
        }
    }
    Ok(None)
}

/// Writes the hop-limit override into the netdevice's RDMA device.
pub fn set_hop_limit(
    rdma_root: &Path,
    sys_root: &Path,
    netdev: &str,
    hop_limit: u8,
) -> DriverResult<()> {
    let rdma_dev = rdma_device_for_netdev(rdma_root, sys_root, netdev)?.ok_or_else(|| {
        DriverError::internal(format!("no RDMA device found for netdevice {}", netdev))
    })?;

    let ttl_path = rdma_root.join(rdma_dev).join("ttl").join("1").join("ttl");
    sysfs::write_int(&ttl_path, u32::from(hop_limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// Fake tree: eth1 and mlx5_0 share a PCI device; eth2 is unrelated.
    fn fixture() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let sys_root = tmp.path().join("net");
        let rdma_root = tmp.path().join("infiniband");

        let pci_a = tmp.path().join("pci").join("0000:03:00.0");
        let pci_b = tmp.path().join("pci").join("0000:04:00.0");
        fs::create_dir_all(&pci_a).unwrap();
        fs::create_dir_all(&pci_b).unwrap();

        fs::create_dir_all(sys_root.join("eth1")).unwrap();
        symlink(&pci_a, sys_root.join("eth1").join("device")).unwrap();
        fs::create_dir_all(sys_root.join("eth2")).unwrap();
        symlink(&pci_b, sys_root.join("eth2").join("device")).unwrap();

        fs::create_dir_all(rdma_root.join("mlx5_0").join("ttl").join("1")).unwrap();
        symlink(&pci_a, rdma_root.join("mlx5_0").join("device")).unwrap();
        fs::write(
            rdma_root.join("mlx5_0").join("ttl").join("1").join("ttl"),
            "0",
        )
        .unwrap();

        (tmp, sys_root, rdma_root)
    }

    #[test]
    fn test_rdma_device_lookup() {
        let (_tmp, sys_root, rdma_root) = fixture();

        let dev = rdma_device_for_netdev(&rdma_root, &sys_root, "eth1").unwrap();
        assert_eq!(dev.as_deref(), Some("mlx5_0"));

        let dev = rdma_device_for_netdev(&rdma_root, &sys_root, "eth2").unwrap();
        assert_eq!(dev, None);
    }

    #[test]
    fn test_missing_rdma_root() {
        let (_tmp, sys_root, _) = fixture();
        let dev =
            rdma_device_for_netdev(Path::new("/nonexistent-rdma"), &sys_root, "eth1").unwrap();
        assert_eq!(dev, None);
    }

    #[test]
    fn test_set_hop_limit() {
        let (_tmp, sys_root, rdma_root) = fixture();

        set_hop_limit(&rdma_root, &sys_root, "eth1", 4).unwrap();
        let raw =
            fs::read_to_string(rdma_root.join("mlx5_0").join("ttl").join("1").join("ttl"))
                .unwrap();
        assert_eq!(raw, "4");
    }

    #[test]
    fn test_set_hop_limit_without_rdma_device() {
        let (_tmp, sys_root, rdma_root) = fixture();
        assert!(set_hop_limit(&rdma_root, &sys_root, "eth2", 4).is_err());
    }
}

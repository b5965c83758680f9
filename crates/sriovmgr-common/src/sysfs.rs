//! Leaf accessors over the `/sys/class/net` device tree.
//!
//! Every helper takes the sysfs root explicitly so tests can point the
//! whole stack at a temporary directory that mimics the kernel layout:
//!
//! ```text
//! <root>/<netdev>/address                    current MAC address
//! <root>/<netdev>/device                  -> PCI device directory
//! <root>/<netdev>/device/sriov_totalvfs      maximum VF count
//! <root>/<netdev>/device/sriov_numvfs        configured VF count
//! <root>/<netdev>/device/virtfn<N>        -> VF PCI device directory
//! <root>/<netdev>/device/virtfn<N>/net/      VF netdevice name(s)
//! <root>/<netdev>/device/driver/unbind       driver detach command file
//! <root>/<netdev>/device/driver/bind         driver attach command file
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{DriverError, DriverResult};

/// Default sysfs root for network class devices.
pub const DEFAULT_SYS_ROOT: &str = "/sys/class/net";

/// File advertising the device's maximum VF count.
pub const MAX_VF_COUNT_FILE: &str = "sriov_totalvfs";

/// File holding the currently configured VF count.
pub const CUR_VF_COUNT_FILE: &str = "sriov_numvfs";

/// Prefix of the per-VF PCI device links.
pub const VF_DEVICE_PREFIX: &str = "virtfn";

/// Returns the PCI device directory of a netdevice.
pub fn device_dir(root: &Path, netdev: &str) -> PathBuf {
    root.join(netdev).join("device")
}

/// Returns true if the netdevice has a PCI device directory.
pub fn device_exists(root: &Path, netdev: &str) -> bool {
    device_dir(root, netdev).exists()
}

/// Reads a decimal integer attribute.
pub fn read_int(path: &Path) -> DriverResult<u32> {
    let raw = fs::read_to_string(path).map_err(|e| DriverError::sysfs(path, e))?;
    raw.trim().parse::<u32>().map_err(|e| {
        DriverError::sysfs(path, io::Error::new(io::ErrorKind::InvalidData, e))
    })
}

/// Writes a decimal integer attribute.
pub fn write_int(path: &Path, value: u32) -> DriverResult<()> {
    fs::write(path, value.to_string()).map_err(|e| DriverError::sysfs(path, e))
}

/// Writes a string attribute.
pub fn write_str(path: &Path, value: &str) -> DriverResult<()> {
    fs::write(path, value).map_err(|e| DriverError::sysfs(path, e))
}

/// Reads a trimmed string attribute.
pub fn read_trimmed(path: &Path) -> DriverResult<String> {
    let raw = fs::read_to_string(path).map_err(|e| DriverError::sysfs(path, e))?;
    Ok(raw.trim().to_string())
}

/// Returns the maximum VF count the device supports.
pub fn max_vf_count(root: &Path, netdev: &str) -> DriverResult<u32> {
    read_int(&device_dir(root, netdev).join(MAX_VF_COUNT_FILE))
}

/// Sets the live VF count (0 disables SR-IOV).
pub fn set_vf_count(root: &Path, netdev: &str, count: u32) -> DriverResult<()> {
    write_int(&device_dir(root, netdev).join(CUR_VF_COUNT_FILE), count)
}

/// Reads the current MAC address of a netdevice.
pub fn netdev_mac(root: &Path, netdev: &str) -> DriverResult<String> {
    read_trimmed(&root.join(netdev).join("address"))
}

/// Lists the `virtfn*` entries of a PF, ordered by VF index.
pub fn list_vf_dirs(root: &Path, netdev: &str) -> DriverResult<Vec<String>> {
    let dir = device_dir(root, netdev);
    let entries = fs::read_dir(&dir).map_err(|e| DriverError::sysfs(&dir, e))?;

    let mut vf_dirs: Vec<(u32, String)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DriverError::sysfs(&dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(index) = name.strip_prefix(VF_DEVICE_PREFIX) {
            if let Ok(index) = index.parse::<u32>() {
                vf_dirs.push((index, name));
            }
        }
    }
    vf_dirs.sort_unstable_by_key(|(index, _)| *index);
    Ok(vf_dirs.into_iter().map(|(_, name)| name).collect())
}

/// Resolves the netdevice name a VF currently exposes, if any.
///
/// The name changes across a driver unbind/rebind cycle, so callers must
/// re-resolve after any bind-state transition instead of caching.
pub fn vf_netdev_name(root: &Path, netdev: &str, vf_dir: &str) -> DriverResult<Option<String>> {
    let net_dir = device_dir(root, netdev).join(vf_dir).join("net");
    let entries = match fs::read_dir(&net_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DriverError::sysfs(&net_dir, e)),
    };

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DriverError::sysfs(&net_dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort_unstable();
    Ok(names.into_iter().next())
}

/// Returns the PCI device name behind a `virtfnN` link (e.g. `0000:03:00.2`).
pub fn vf_pci_dev_name(root: &Path, netdev: &str, vf_dir: &str) -> DriverResult<String> {
    let link = device_dir(root, netdev).join(vf_dir);
    let target = fs::read_link(&link).map_err(|e| DriverError::sysfs(&link, e))?;
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DriverError::sysfs(
                &link,
                io::Error::new(io::ErrorKind::InvalidData, "dangling virtfn link"),
            )
        })
}

/// Detaches a VF PCI device from its driver.
pub fn unbind_vf(root: &Path, netdev: &str, vf_pci_dev: &str) -> DriverResult<()> {
    write_str(
        &device_dir(root, netdev).join("driver").join("unbind"),
        vf_pci_dev,
    )
}

/// Attaches a VF PCI device back to its driver.
pub fn bind_vf(root: &Path, netdev: &str, vf_pci_dev: &str) -> DriverResult<()> {
    write_str(
        &device_dir(root, netdev).join("driver").join("bind"),
        vf_pci_dev,
    )
}

/// Finds the `virtfnN` entry whose VF currently exposes the given netdevice.
pub fn find_vf_dir_for_netdev(
    root: &Path,
    pf_netdev: &str,
    vf_netdev: &str,
) -> DriverResult<Option<String>> {
    for vf_dir in list_vf_dirs(root, pf_netdev)? {
        let net_dir = device_dir(root, pf_netdev).join(&vf_dir).join("net");
        let entries = match fs::read_dir(&net_dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy() == vf_netdev {
                return Ok(Some(vf_dir));
            }
        }
    }
    Ok(None)
}

/// Lists every netdevice under the sysfs root.
pub fn list_netdevs(root: &Path) -> DriverResult<Vec<String>> {
    let entries = fs::read_dir(root).map_err(|e| DriverError::sysfs(root, e))?;
    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DriverError::sysfs(root, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort_unstable();
    Ok(names)
}

/// Returns true if another netdevice shares this one's PCI device.
///
/// Multi-port ASICs expose each physical port as a separate netdevice
/// backed by the same PCI function; those devices need the port-mapping
/// discovery path instead of plain `virtfn*` enumeration.
pub fn is_multiport_device(root: &Path, netdev: &str) -> bool {
    let own_target = match fs::read_link(root.join(netdev).join("device")) {
        Ok(target) => target,
        Err(_) => return false,
    };

    let siblings = match list_netdevs(root) {
        Ok(names) => names,
        Err(_) => return false,
    };

    for sibling in siblings {
        if sibling == netdev {
            continue;
        }
        if let Ok(target) = fs::read_link(root.join(&sibling).join("device")) {
            if target == own_target {
                return true;
            }
        }
    }
    false
}

//! Fake sysfs fixtures shared by the daemon's unit tests.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use sriovmgr_common::sysfs::{device_dir, CUR_VF_COUNT_FILE, MAX_VF_COUNT_FILE, VF_DEVICE_PREFIX};

/// Builds `<root>/<pf>/device -> <root>/pci/<pci_id>` with SR-IOV
/// attribute files and an empty driver command directory.
pub(crate) fn make_pf(root: &Path, pf: &str, pci_id: &str, total_vfs: u32) {
    let pci_dir = root.join("pci").join(pci_id);
    fs::create_dir_all(&pci_dir).unwrap();
    fs::write(pci_dir.join(MAX_VF_COUNT_FILE), total_vfs.to_string()).unwrap();
    fs::write(pci_dir.join(CUR_VF_COUNT_FILE), "0").unwrap();
    fs::create_dir_all(pci_dir.join("driver")).unwrap();
    fs::write(pci_dir.join("driver").join("unbind"), "").unwrap();
    fs::write(pci_dir.join("driver").join("bind"), "").unwrap();

    fs::create_dir_all(root.join(pf)).unwrap();
    fs::write(root.join(pf).join("address"), "aa:bb:cc:00:00:01\n").unwrap();
    symlink(&pci_dir, root.join(pf).join("device")).unwrap();
}

/// Adds `virtfn<idx>` under the PF pointing at a VF PCI directory that
/// exposes `vf_netdev`, and registers the VF netdevice at the root with a
/// fixture MAC of `aa:bb:cc:00:01:<idx>`.
pub(crate) fn make_vf(root: &Path, pf: &str, idx: u32, vf_pci: &str, vf_netdev: &str) {
    let vf_pci_dir = root.join("pci").join(vf_pci);
    fs::create_dir_all(vf_pci_dir.join("net").join(vf_netdev)).unwrap();
    symlink(
        &vf_pci_dir,
        device_dir(root, pf).join(format!("{}{}", VF_DEVICE_PREFIX, idx)),
    )
    .unwrap();

    fs::create_dir_all(root.join(vf_netdev)).unwrap();
    fs::write(
        root.join(vf_netdev).join("address"),
        format!("aa:bb:cc:00:01:{:02x}\n", idx),
    )
    .unwrap();
}

/// Builds a second netdevice sharing the PF's PCI device, making the pair
/// look like two ports of one ASIC.
pub(crate) fn make_sibling_port(root: &Path, pf: &str, sibling: &str) {
    let target = fs::read_link(root.join(pf).join("device")).unwrap();
    fs::create_dir_all(root.join(sibling)).unwrap();
    fs::write(root.join(sibling).join("address"), "aa:bb:cc:00:00:02\n").unwrap();
    symlink(target, root.join(sibling).join("device")).unwrap();
}

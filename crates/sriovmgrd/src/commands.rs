//! Shell command builders for netdevice and VF operations.

use sriovmgr_common::shell::{self, shellquote};

/// Build the command that brings a PF link up.
///
/// `ip link set ... up` is idempotent, so the link's current oper state
/// does not need to be checked first.
pub fn build_link_up_cmd(netdev: &str) -> String {
    format!("{} link set dev {} up", shell::IP_CMD, shellquote(netdev))
}

/// Build the command that programs a VF's administrative MAC address.
pub fn build_vf_mac_cmd(netdev: &str, vf_index: u32, mac: &str) -> String {
    format!(
        "{} link set dev {} vf {} mac {}",
        shell::IP_CMD,
        shellquote(netdev),
        vf_index,
        shellquote(mac)
    )
}

/// Build the command that sets a VF's VLAN tag.
pub fn build_vf_vlan_cmd(netdev: &str, vf_index: u32, vlan: u16) -> String {
    format!(
        "{} link set dev {} vf {} vlan {}",
        shell::IP_CMD,
        shellquote(netdev),
        vf_index,
        vlan
    )
}

/// Build the command that toggles a VF's trusted flag.
pub fn build_vf_trust_cmd(netdev: &str, vf_index: u32, trusted: bool) -> String {
    format!(
        "{} link set dev {} vf {} trust {}",
        shell::IP_CMD,
        shellquote(netdev),
        vf_index,
        if trusted { "on" } else { "off" }
    )
}

/// Build the command that toggles a VF's source MAC spoof checking.
pub fn build_vf_spoofchk_cmd(netdev: &str, vf_index: u32, checked: bool) -> String {
    format!(
        "{} link set dev {} vf {} spoofchk {}",
        shell::IP_CMD,
        shellquote(netdev),
        vf_index,
        if checked { "on" } else { "off" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_link_up_cmd() {
        let cmd = build_link_up_cmd("eth1");
        assert!(cmd.contains("link set dev"));
        assert!(cmd.contains("\"eth1\""));
        assert!(cmd.ends_with("up"));
    }

    #[test]
    fn test_build_vf_mac_cmd() {
        let cmd = build_vf_mac_cmd("eth1", 3, "aa:bb:cc:dd:ee:ff");
        assert!(cmd.contains("vf 3"));
        assert!(cmd.contains("mac \"aa:bb:cc:dd:ee:ff\""));
    }

    #[test]
    fn test_build_vf_vlan_cmd() {
        let cmd = build_vf_vlan_cmd("eth1", 0, 100);
        assert!(cmd.contains("vf 0"));
        assert!(cmd.contains("vlan 100"));
    }

    #[test]
    fn test_build_vf_trust_cmd() {
        assert!(build_vf_trust_cmd("eth1", 1, true).ends_with("trust on"));
        assert!(build_vf_trust_cmd("eth1", 1, false).ends_with("trust off"));
    }

    #[test]
    fn test_build_vf_spoofchk_cmd() {
        assert!(build_vf_spoofchk_cmd("eth1", 1, true).ends_with("spoofchk on"));
        assert!(build_vf_spoofchk_cmd("eth1", 1, false).ends_with("spoofchk off"));
    }

    #[test]
    fn test_device_names_are_quoted() {
        let cmd = build_link_up_cmd("eth1; reboot");
        assert!(cmd.contains("\"eth1; reboot\""));
    }
}

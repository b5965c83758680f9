//! Port-to-netdevice mapping for dual-port devices.
//!
//! Multi-port ASICs expose their VFs as sibling netdevices of the PF
//! rather than `virtfn*` children of a single function, so discovery runs
//! the `ibdev2netdev` mapping tool and groups netdevices by physical
//! port. Parsing is kept pure; the tool invocation lives in the dual-port
//! pool.

/// One line of mapping output: a netdevice and the physical port it sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    /// Netdevice name.
    pub netdev: String,
    /// 1-based physical port number.
    pub port: u32,
}

/// Parses `ibdev2netdev` output of the form
/// `mlx5_0 port 1 ==> ens2f0 (Up)` into port entries.
///
/// Lines that do not match the expected shape are skipped.
pub fn parse_port_map(output: &str) -> Vec<PortEntry> {
    output
        .lines()
        .filter_map(|line| {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() < 6 {
                return None;
            }
            let port = words[2].parse::<u32>().ok()?;
            Some(PortEntry {
                netdev: words[4].to_string(),
                port,
            })
        })
        .collect()
}

/// Looks up the physical port a netdevice sits on.
pub fn find_phy_port(map: &[PortEntry], netdev: &str) -> Option<u32> {
    map.iter()
        .find(|entry| entry.netdev == netdev)
        .map(|entry| entry.port)
}

/// Lists the netdevices sharing a physical port, excluding the parent
/// itself. These are the allocatable VF netdevices of a dual-port PF.
pub fn child_netdevs(map: &[PortEntry], netdev: &str, port: u32) -> Vec<String> {
    map.iter()
        .filter(|entry| entry.port == port && entry.netdev != netdev)
        .map(|entry| entry.netdev.clone())
        .collect()
}

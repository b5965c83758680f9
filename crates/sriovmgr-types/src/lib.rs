//! Common network primitives for the SR-IOV plugin daemon.
//!
//! Type-safe representations of the values that cross the driver boundary:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanTag`]: IEEE 802.1Q VLAN tags as the plugin accepts them (0 = untagged)
//! - [`Ipv4Net`]: IPv4 address with prefix length (CIDR notation)

mod mac;
mod net;
mod vlan;

pub use mac::MacAddress;
pub use net::Ipv4Net;
pub use vlan::VlanTag;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IPv4 CIDR format: {0}")]
    InvalidIpv4Net(String),

    #[error("invalid vlan id: {0} (valid range is 0-4095)")]
    InvalidVlanTag(String),
}

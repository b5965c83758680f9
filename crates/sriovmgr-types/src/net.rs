//! IPv4 CIDR type used for gateways and subnets.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 address with a prefix length, e.g. `192.168.1.1/24`.
///
/// The IPAM data handed to the driver carries both the pool subnet and the
/// gateway in this form; Join responses strip the prefix and hand back the
/// bare gateway address.
///
/// # Examples
///
/// ```
/// use sriovmgr_types::Ipv4Net;
///
/// let gw: Ipv4Net = "192.168.1.1/24".parse().unwrap();
/// assert_eq!(gw.addr().to_string(), "192.168.1.1");
/// assert_eq!(gw.prefix_len(), 24);
/// assert_eq!(gw.to_string(), "192.168.1.1/24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Net {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Net {
    /// Creates a network from an address and prefix length.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length exceeds 32.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > 32 {
            return Err(ParseError::InvalidIpv4Net(format!(
                "{}/{}",
                addr, prefix_len
            )));
        }
        Ok(Ipv4Net { addr, prefix_len })
    }

    /// Returns the address part.
    pub const fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// Returns the prefix length.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Ipv4Net {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, len_part) = s
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidIpv4Net(s.to_string()))?;
        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| ParseError::InvalidIpv4Net(s.to_string()))?;
        let prefix_len: u8 = len_part
            .parse()
            .map_err(|_| ParseError::InvalidIpv4Net(s.to_string()))?;
        Ipv4Net::new(addr, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Net {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Net> for String {
    fn from(net: Ipv4Net) -> String {
        net.to_string()
    }
}

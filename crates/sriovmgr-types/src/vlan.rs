//! VLAN tag type as the plugin accepts it.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An 802.1Q VLAN tag in the range 0-4095.
///
/// Unlike bridge VLAN membership, the VF VLAN offload accepts the whole
/// 12-bit range: tag 0 means "leave traffic untagged" and is the default
/// for networks created without a `vlan` option.
///
/// # Examples
///
/// ```
/// use sriovmgr_types::VlanTag;
///
/// let vlan: VlanTag = "10".parse().unwrap();
/// assert_eq!(vlan.as_u16(), 10);
/// assert!(!vlan.is_untagged());
/// assert!(VlanTag::UNTAGGED.is_untagged());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanTag(u16);

impl VlanTag {
    /// Maximum valid tag value.
    pub const MAX: u16 = 4095;

    /// Tag 0: traffic stays untagged.
    pub const UNTAGGED: VlanTag = VlanTag(0);

    /// Creates a tag, validating the 0-4095 range.
    pub fn new(tag: u16) -> Result<Self, ParseError> {
        if tag <= Self::MAX {
            Ok(VlanTag(tag))
        } else {
            Err(ParseError::InvalidVlanTag(tag.to_string()))
        }
    }

    /// Returns the raw tag value.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true for tag 0 (no VLAN configured).
    pub const fn is_untagged(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanTag {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag: u16 = s
            .parse()
            .map_err(|_| ParseError::InvalidVlanTag(s.to_string()))?;
        VlanTag::new(tag)
    }
}

impl TryFrom<u16> for VlanTag {
    type Error = ParseError;

    fn try_from(tag: u16) -> Result<Self, Self::Error> {
        VlanTag::new(tag)
    }
}

impl From<VlanTag> for u16 {
    fn from(vlan: VlanTag) -> u16 {
        vlan.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_tags() {
        assert!(VlanTag::new(0).is_ok());
        assert!(VlanTag::new(1).is_ok());
        assert!(VlanTag::new(4095).is_ok());
    }

    #[test]
    fn test_invalid_tags() {
        assert!(VlanTag::new(4096).is_err());
        assert!(VlanTag::new(u16::MAX).is_err());
    }

    #[test]
    fn test_untagged() {
        assert!(VlanTag::UNTAGGED.is_untagged());
        assert!(VlanTag::default().is_untagged());
        assert!(!VlanTag::new(100).unwrap().is_untagged());
    }

    #[test]
    fn test_parse() {
        let vlan: VlanTag = "4095".parse().unwrap();
        assert_eq!(vlan.as_u16(), 4095);
        assert!("4096".parse::<VlanTag>().is_err());
        assert!("-1".parse::<VlanTag>().is_err());
        assert!("ten".parse::<VlanTag>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(VlanTag::new(10).unwrap().to_string(), "10");
    }
}

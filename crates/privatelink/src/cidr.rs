//! IPv4 address ranges in CIDR notation.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a CIDR block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// Missing `/prefix` part.
    #[error("missing prefix length in '{0}'")]
    MissingPrefix(String),

    /// Address part is not a dotted IPv4 address.
    #[error("invalid IPv4 address in '{0}'")]
    InvalidAddress(String),

    /// Prefix is not a number in `0..=32`.
    #[error("invalid prefix length in '{0}'")]
    InvalidPrefix(String),

    /// Address has bits set below the prefix.
    #[error("'{value}' has host bits set, expected {expected}")]
    HostBitsSet { value: String, expected: String },
}

/// An IPv4 network such as `10.0.0.0/24`.
///
/// The address is always the network address: host bits are rejected at
/// parse time rather than silently masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr(Ipv4Net);

impl Ipv4Cidr {
    /// Build a CIDR from a network address and prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix exceeds 32 or host bits are set.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        let net = Ipv4Net::new(network, prefix)
            .map_err(|_| CidrError::InvalidPrefix(format!("{network}/{prefix}")))?;
        if net.trunc() != net {
            return Err(CidrError::HostBitsSet {
                value: net.to_string(),
                expected: net.trunc().to_string(),
            });
        }
        Ok(Self(net))
    }

    /// Wrap a network known at compile time.
    ///
    /// `net` must already be truncated to its prefix.
    #[must_use]
    pub const fn from_net(net: Ipv4Net) -> Self {
        Self(net)
    }

    /// The underlying network.
    #[must_use]
    pub fn as_net(&self) -> &Ipv4Net {
        &self.0
    }

    /// Network address.
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Prefix length.
    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Number of addresses in the block.
    #[must_use]
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix()))
    }

    /// Whether `addr` falls inside this block.
    #[must_use]
    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        self.0.contains(&addr)
    }

    /// Whether `other` lies entirely inside this block.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.0.contains(&other.0)
    }

    /// Whether the two blocks share at least one address.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.contains(&other.0) || other.0.contains(&self.0)
    }

    /// The `index`-th block of length `prefix` carved out of this one.
    ///
    /// Returns `None` when `prefix` is shorter than this block's prefix,
    /// longer than 32, or `index` is past the last block.
    #[must_use]
    pub fn subnet(&self, prefix: u8, index: u32) -> Option<Self> {
        let index = usize::try_from(index).ok()?;
        self.0.subnets(prefix).ok()?.nth(index).map(Self)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::MissingPrefix(s.to_string()))?;
        let network: Ipv4Addr = addr
            .parse()
            .map_err(|_| CidrError::InvalidAddress(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrError::InvalidPrefix(s.to_string()))?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Ipv4Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let c = cidr("10.0.0.0/24");
        assert_eq!(c.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(c.prefix(), 24);
        assert_eq!(c.size(), 256);
        assert_eq!(c.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "10.0.0.0".parse::<Ipv4Cidr>(),
            Err(CidrError::MissingPrefix(_))
        ));
        assert!(matches!(
            "10.0.0/24".parse::<Ipv4Cidr>(),
            Err(CidrError::InvalidAddress(_))
        ));
        assert!(matches!(
            "10.0.0.0/33".parse::<Ipv4Cidr>(),
            Err(CidrError::InvalidPrefix(_))
        ));
        assert_eq!(
            "10.0.0.1/24".parse::<Ipv4Cidr>(),
            Err(CidrError::HostBitsSet {
                value: "10.0.0.1/24".into(),
                expected: "10.0.0.0/24".into(),
            })
        );
    }

    #[test]
    fn test_overlap() {
        let a = cidr("10.0.0.0/24");
        assert!(a.overlaps(&cidr("10.0.0.128/25")));
        assert!(a.overlaps(&cidr("10.0.0.0/16")));
        assert!(!a.overlaps(&cidr("10.0.1.0/24")));
        assert!(!a.overlaps(&cidr("192.168.0.0/24")));
    }

    #[test]
    fn test_contains() {
        let a = cidr("192.168.0.0/24");
        assert!(a.contains(&cidr("192.168.0.16/28")));
        assert!(!a.contains(&cidr("192.168.0.0/23")));
        assert!(!a.contains(&cidr("10.0.0.0/28")));
    }

    #[test]
    fn test_subnet_carving() {
        let a = cidr("10.0.0.0/24");
        assert_eq!(a.subnet(28, 0), Some(cidr("10.0.0.0/28")));
        assert_eq!(a.subnet(28, 1), Some(cidr("10.0.0.16/28")));
        assert_eq!(a.subnet(28, 15), Some(cidr("10.0.0.240/28")));
        assert_eq!(a.subnet(28, 16), None);
        assert_eq!(a.subnet(23, 0), None);
        assert_eq!(a.subnet(33, 0), None);
    }

    #[test]
    fn test_const_network_matches_parsed() {
        const NET: Ipv4Cidr =
            Ipv4Cidr::from_net(Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 24));
        assert_eq!(NET, cidr("10.0.0.0/24"));
        assert_eq!(NET.as_net().prefix_len(), 24);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&cidr("10.0.0.0/24")).unwrap();
        assert_eq!(json, "\"10.0.0.0/24\"");
        let back: Ipv4Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cidr("10.0.0.0/24"));
        assert!(serde_json::from_str::<Ipv4Cidr>("\"10.0.0.5/24\"").is_err());
    }
}

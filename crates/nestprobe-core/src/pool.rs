use crate::error::{ProbeResult, ProberError};
use crate::types::IpVersion;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// The maximum number of addresses a pool may hold.
///
/// Bounds the prefix length to /16 for IPv4 and /112 for IPv6.
pub const MAX_POOL_SIZE: usize = 1 << 16;

/// An ordered pool of addresses materialized from a CIDR range.
///
/// Every address in the range is enumerated, including network and broadcast
/// addresses.  Addresses are picked by sequence number modulo the pool size
/// to rotate ECMP entropy across the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrPool {
    addrs: Vec<IpAddr>,
}

impl AddrPool {
    /// Materialize the pool for a CIDR range.
    ///
    /// Ranges holding more than [`MAX_POOL_SIZE`] addresses are rejected.
    pub fn from_network(network: IpNetwork) -> ProbeResult<Self> {
        let addrs = match network {
            IpNetwork::V4(net) => {
                if net.prefix() < 16 {
                    return Err(ProberError::AddressRangeTooLarge(
                        net.to_string(),
                        MAX_POOL_SIZE,
                    ));
                }
                let base = u32::from(net.network());
                let count = 1_u32 << (32 - net.prefix());
                (0..count)
                    .map(|i| IpAddr::from(std::net::Ipv4Addr::from(base + i)))
                    .collect()
            }
            IpNetwork::V6(net) => {
                if net.prefix() < 112 {
                    return Err(ProberError::AddressRangeTooLarge(
                        net.to_string(),
                        MAX_POOL_SIZE,
                    ));
                }
                let base = u128::from(net.network());
                let count = 1_u128 << (128 - net.prefix());
                (0..count)
                    .map(|i| IpAddr::from(std::net::Ipv6Addr::from(base + i)))
                    .collect()
            }
        };
        Ok(Self { addrs })
    }

    /// Parse and materialize the pool for a CIDR range in string form.
    pub fn from_cidr(cidr: &str) -> ProbeResult<Self> {
        let network = cidr
            .parse::<IpNetwork>()
            .map_err(|err| ProberError::BadConfig(format!("invalid range {cidr}: {err}")))?;
        Self::from_network(network)
    }

    /// The address for a given sequence number.
    #[must_use]
    pub fn addr(&self, sequence: u64) -> IpAddr {
        self.addrs[(sequence % self.addrs.len() as u64) as usize]
    }

    /// The first address of the pool.
    #[must_use]
    pub fn first(&self) -> IpAddr {
        self.addrs[0]
    }

    /// The IP version of the pooled addresses.
    #[must_use]
    pub fn version(&self) -> IpVersion {
        match self.addrs[0] {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

//! Packet wire format parsing and building.
//!
//! The following packets are supported:
//! - `GRE`
//! - `IPv4`
//! - `IPv6`
//! - `UDP`
//!
//! # Endianness
//!
//! The internal representation is held in network byte order (big-endian) and
//! all accessor methods take and return data in host byte order, converting as
//! necessary for the given architecture.
//!
//! # Example
//!
//! The following example builds a minimal `GRE` header carrying `IPv4`:
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use nestprobe_packet::gre::GrePacket;
//! use nestprobe_packet::EtherType;
//!
//! let mut buf = [0; GrePacket::minimum_packet_size()];
//! let mut gre = GrePacket::new(&mut buf)?;
//! gre.set_flags_and_version(0);
//! gre.set_protocol(EtherType::Ipv4);
//! assert_eq!(gre.packet(), &hex_literal::hex!("00 00 08 00"));
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod buffer;

/// Packet errors.
pub mod error;

/// Functions for calculating network checksums.
pub mod checksum;

/// `GRE` packets.
pub mod gre;

/// `IPv4` packets.
pub mod ipv4;

/// `IPv6` packets.
pub mod ipv6;

/// `UDP` packets.
pub mod udp;

/// The IP packet next layer protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IpProtocol {
    Udp,
    Gre,
    Other(u8),
}

impl IpProtocol {
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Udp => 17,
            Self::Gre => 47,
            Self::Other(id) => id,
        }
    }
}

impl From<u8> for IpProtocol {
    fn from(id: u8) -> Self {
        match id {
            17 => Self::Udp,
            47 => Self::Gre,
            p => Self::Other(p),
        }
    }
}

/// The protocol carried inside a `GRE` tunnel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Other(u16),
}

impl EtherType {
    #[must_use]
    pub const fn id(self) -> u16 {
        match self {
            Self::Ipv4 => 0x0800,
            Self::Ipv6 => 0x86DD,
            Self::Other(id) => id,
        }
    }
}

impl From<u16> for EtherType {
    fn from(id: u16) -> Self {
        match id {
            0x0800 => Self::Ipv4,
            0x86DD => Self::Ipv6,
            p => Self::Other(p),
        }
    }
}

/// Format a payload as a hexadecimal string.
#[must_use]
pub fn fmt_payload(bytes: &[u8]) -> String {
    use itertools::Itertools as _;
    format!("{:02x}", bytes.iter().format(" "))
}

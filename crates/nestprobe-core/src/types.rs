use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// `TypeOfService` (IPv4 `TOS` / IPv6 `Traffic Class`) newtype.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, Hash, Deserialize,
)]
#[serde(transparent)]
pub struct TypeOfService(pub u8);

impl Display for TypeOfService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Port newtype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd)]
pub struct Port(pub u16);

/// The IP version of a probed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// Internet Protocol v4.
    V4,
    /// Internet Protocol v6.
    V6,
}

impl IpVersion {
    #[must_use]
    pub const fn is_ipv4(self) -> bool {
        match self {
            Self::V4 => true,
            Self::V6 => false,
        }
    }
}

impl Display for IpVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "v4"),
            Self::V6 => write!(f, "v6"),
        }
    }
}

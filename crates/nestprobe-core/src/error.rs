use nestprobe_packet::error::PacketError;
use std::fmt::{Display, Formatter};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// A prober error result.
pub type ProbeResult<T> = Result<T, ProberError>;

/// A prober error.
#[derive(Error, Debug)]
pub enum ProberError {
    #[error("invalid packet: {0}")]
    PacketError(#[from] PacketError),
    #[error("short probe record: expected 16 bytes, got {0}")]
    ShortProbe(usize),
    #[error("invalid config: {0}")]
    BadConfig(String),
    #[error("unknown router {router} in path {path}")]
    UnknownRouter { path: String, router: String },
    #[error("address range {0} holds more than {1} addresses")]
    AddressRangeTooLarge(String, usize),
    #[error("mixed address families in path {0}")]
    MixedAddressFamily(String),
    #[error("unknown interface: {0}")]
    UnknownInterface(String),
    #[error("no free UDP port in {0}..=65535")]
    UdpPortsExhausted(u16),
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
}

/// Custom IO error result.
pub type IoResult<T> = Result<T, IoError>;

/// Custom IO error.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Bind error for {1}: {0}")]
    Bind(io::Error, SocketAddr),
    #[error("Connect error for {1}: {0}")]
    Connect(io::Error, SocketAddr),
    #[error("Sendto error for {1}: {0}")]
    SendTo(io::Error, SocketAddr),
    #[error("Failed to {0}: {1}")]
    Other(io::Error, IoOperation),
}

/// Io operation.
#[derive(Debug)]
pub enum IoOperation {
    NewSocket,
    SetHeaderIncluded,
    SetTclassV6,
    SetUnicastHopsV6,
    SetReadTimeout,
    LocalAddr,
}

impl Display for IoOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSocket => write!(f, "create new socket"),
            Self::SetHeaderIncluded => write!(f, "set header included"),
            Self::SetTclassV6 => write!(f, "set tclass v6"),
            Self::SetUnicastHopsV6 => write!(f, "set unicast hops v6"),
            Self::SetReadTimeout => write!(f, "set read timeout"),
            Self::LocalAddr => write!(f, "local addr"),
        }
    }
}

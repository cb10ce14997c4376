use crate::error::{IoError, IoOperation, ProbeResult, ProberError};
use crate::types::IpVersion;
use nix::sys::socket::{AddressFamily, SockaddrLike};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

/// The port used for local address discovery; no packet is ever sent to it.
const DISCOVERY_PORT: u16 = 123;

/// Resolve the local return address stamped into the innermost IP header.
///
/// A configured address wins; otherwise the kernel picks one by routing
/// towards the first hop's first destination address.
pub(crate) fn resolve_local_addr(
    configured: Option<IpAddr>,
    first_hop_dst: IpAddr,
) -> ProbeResult<IpAddr> {
    match configured {
        Some(addr) => Ok(addr),
        None => discover_local_addr(first_hop_dst),
    }
}

/// The first address of the given family on the named interface.
pub(crate) fn lookup_interface_addr(version: IpVersion, name: &str) -> ProbeResult<IpAddr> {
    match version {
        IpVersion::V4 => lookup_interface_addr_ipv4(name),
        IpVersion::V6 => lookup_interface_addr_ipv6(name),
    }
}

fn lookup_interface_addr_ipv4(name: &str) -> ProbeResult<IpAddr> {
    nix::ifaddrs::getifaddrs()
        .map_err(|_| ProberError::UnknownInterface(name.to_string()))?
        .find_map(|ia| {
            ia.address.and_then(|addr| match addr.family() {
                Some(AddressFamily::Inet) if ia.interface_name == name => addr
                    .as_sockaddr_in()
                    .map(|sock_addr| IpAddr::V4(sock_addr.ip())),
                _ => None,
            })
        })
        .ok_or_else(|| ProberError::UnknownInterface(name.to_string()))
}

fn lookup_interface_addr_ipv6(name: &str) -> ProbeResult<IpAddr> {
    nix::ifaddrs::getifaddrs()
        .map_err(|_| ProberError::UnknownInterface(name.to_string()))?
        .find_map(|ia| {
            ia.address.and_then(|addr| match addr.family() {
                Some(AddressFamily::Inet6) if ia.interface_name == name => addr
                    .as_sockaddr_in6()
                    .map(|sock_addr| IpAddr::V6(sock_addr.ip())),
                _ => None,
            })
        })
        .ok_or_else(|| ProberError::UnknownInterface(name.to_string()))
}

// Note that no packets are transmitted by this method.
fn discover_local_addr(target: IpAddr) -> ProbeResult<IpAddr> {
    let unspecified = match target {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let bind_addr = SocketAddr::new(unspecified, 0);
    let socket =
        UdpSocket::bind(bind_addr).map_err(|err| IoError::Bind(err, bind_addr))?;
    let remote_addr = SocketAddr::new(target, DISCOVERY_PORT);
    socket
        .connect(remote_addr)
        .map_err(|err| IoError::Connect(err, remote_addr))?;
    Ok(socket
        .local_addr()
        .map_err(|err| IoError::Other(err, IoOperation::LocalAddr))?
        .ip())
}

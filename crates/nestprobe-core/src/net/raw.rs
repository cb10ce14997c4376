use crate::error::{IoError, IoOperation, IoResult, ProbeResult, ProberError};
use crate::packet::TTL;
use crate::types::{IpVersion, TypeOfService};
use nestprobe_packet::checksum::ipv4_header_checksum;
use nestprobe_packet::ipv4::Ipv4Packet;
use nestprobe_packet::IpProtocol;
use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags, SockaddrIn6};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::IoSlice;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::os::fd::AsRawFd;

/// The socket used to emit GRE probe packets.
///
/// For IPv4 the socket runs with `IP_HDRINCL` and the outer IPv4 header is
/// assembled here at send time: writing the source address into the header
/// keeps policy routing (`ip rule`) effective.  For IPv6 the traffic class
/// and hop limit are socket options and the source address travels in the
/// packet-info control message of each `sendmsg` call.
#[derive(Debug)]
pub(crate) struct RawSocket {
    inner: Socket,
    tos: TypeOfService,
}

impl RawSocket {
    pub(crate) fn new(version: IpVersion, tos: TypeOfService) -> IoResult<Self> {
        let gre = Protocol::from(i32::from(IpProtocol::Gre.id()));
        let inner = match version {
            IpVersion::V4 => {
                let socket = Socket::new(Domain::IPV4, Type::RAW, Some(gre))
                    .map_err(|err| IoError::Other(err, IoOperation::NewSocket))?;
                socket
                    .set_header_included(true)
                    .map_err(|err| IoError::Other(err, IoOperation::SetHeaderIncluded))?;
                socket
            }
            IpVersion::V6 => {
                let socket = Socket::new(Domain::IPV6, Type::RAW, Some(gre))
                    .map_err(|err| IoError::Other(err, IoOperation::NewSocket))?;
                socket
                    .set_tclass_v6(u32::from(tos.0))
                    .map_err(|err| IoError::Other(err, IoOperation::SetTclassV6))?;
                socket
                    .set_unicast_hops_v6(u32::from(TTL))
                    .map_err(|err| IoError::Other(err, IoOperation::SetUnicastHopsV6))?;
                socket
            }
        };
        Ok(Self { inner, tos })
    }

    /// Send a probe body whose first bytes are the outermost GRE header.
    pub(crate) fn send(&self, body: &[u8], src: IpAddr, dst: IpAddr) -> ProbeResult<()> {
        match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => self.send_v4(body, src, dst),
            (IpAddr::V6(src), IpAddr::V6(dst)) => self.send_v6(body, src, dst),
            _ => Err(ProberError::BadConfig(format!(
                "address family mismatch: {src} -> {dst}"
            ))),
        }
    }

    fn send_v4(&self, body: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> ProbeResult<()> {
        let mut buf = vec![0_u8; Ipv4Packet::minimum_packet_size() + body.len()];
        let mut ipv4 = Ipv4Packet::new(&mut buf)?;
        ipv4.set_version(4);
        ipv4.set_header_length(5);
        ipv4.set_tos(self.tos.0);
        ipv4.set_total_length((Ipv4Packet::minimum_packet_size() + body.len()) as u16);
        ipv4.set_ttl(TTL);
        ipv4.set_protocol(IpProtocol::Gre);
        ipv4.set_source(src);
        ipv4.set_destination(dst);
        ipv4.set_payload(body);
        let checksum = ipv4_header_checksum(ipv4.header());
        ipv4.set_checksum(checksum);
        let remote_addr = SocketAddr::new(IpAddr::V4(dst), 0);
        self.inner
            .send_to(&buf, &SockAddr::from(remote_addr))
            .map_err(|err| ProberError::IoError(IoError::SendTo(err, remote_addr)))?;
        Ok(())
    }

    fn send_v6(&self, body: &[u8], src: Ipv6Addr, dst: Ipv6Addr) -> ProbeResult<()> {
        let remote_addr = SocketAddrV6::new(dst, 0, 0, 0);
        let addr = SockaddrIn6::from(remote_addr);
        let pktinfo = nix::libc::in6_pktinfo {
            ipi6_addr: nix::libc::in6_addr {
                s6_addr: src.octets(),
            },
            ipi6_ifindex: 0,
        };
        let cmsgs = [ControlMessage::Ipv6PacketInfo(&pktinfo)];
        sendmsg(
            self.inner.as_raw_fd(),
            &[IoSlice::new(body)],
            &cmsgs,
            MsgFlags::empty(),
            Some(&addr),
        )
        .map_err(|errno| {
            ProberError::IoError(IoError::SendTo(errno.into(), SocketAddr::V6(remote_addr)))
        })?;
        Ok(())
    }
}

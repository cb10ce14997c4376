use crate::config::Hop;
use crate::error::{ProbeResult, ProberError};
use crate::probe::{Probe, PROBE_SIZE};
use crate::types::{IpVersion, Port, TypeOfService};
use nestprobe_packet::checksum::{ipv4_header_checksum, udp_ipv4_checksum, udp_ipv6_checksum};
use nestprobe_packet::gre::GrePacket;
use nestprobe_packet::ipv4::Ipv4Packet;
use nestprobe_packet::ipv6::Ipv6Packet;
use nestprobe_packet::udp::UdpPacket;
use nestprobe_packet::{EtherType, IpProtocol};
use std::net::IpAddr;

/// The size of the receive buffer; nothing we build may exceed it.
pub const MAX_PACKET_SIZE: usize = 9216;

/// The TTL / hop limit stamped into every IP header of a probe packet.
pub(crate) const TTL: u8 = 64;

/// Builds the nested GRE(IP(GRE(...IP(UDP(probe, payload))))) byte sequence
/// for one probe.
///
/// The buffer starts with the outermost GRE header: the outer IP header is
/// not included as it is supplied by the raw socket at send time.  For a hop
/// list of length H the buffer holds H GRE headers and H IP headers, the
/// first hop being addressed by the outer IP header only.  Addresses are
/// picked from the hop pools by sequence number so consecutive probes rotate
/// ECMP entropy across each range.
#[derive(Debug)]
pub(crate) struct PacketBuilder<'a> {
    hops: &'a [Hop],
    tos: TypeOfService,
    ip_version: IpVersion,
    port: Port,
    local_addr: IpAddr,
    payload: &'a [u8],
}

impl<'a> PacketBuilder<'a> {
    pub(crate) fn new(
        hops: &'a [Hop],
        tos: TypeOfService,
        ip_version: IpVersion,
        port: Port,
        local_addr: IpAddr,
        payload: &'a [u8],
    ) -> Self {
        Self {
            hops,
            tos,
            ip_version,
            port,
            local_addr,
            payload,
        }
    }

    /// Serialize the full probe packet for one sequence number.
    pub(crate) fn build(&self, probe: &Probe) -> ProbeResult<Vec<u8>> {
        let ip_header_size = match self.ip_version {
            IpVersion::V4 => Ipv4Packet::minimum_packet_size(),
            IpVersion::V6 => Ipv6Packet::minimum_packet_size(),
        };
        let gre_size = GrePacket::minimum_packet_size();
        let udp_size = UdpPacket::minimum_packet_size() + PROBE_SIZE + self.payload.len();
        let hop_count = self.hops.len();
        let total = gre_size + (hop_count - 1) * (ip_header_size + gre_size) + ip_header_size
            + udp_size;
        let sequence = probe.sequence;
        let mut buf = vec![0_u8; total];
        let mut offset = 0;
        self.write_gre(&mut buf[offset..])?;
        offset += gre_size;
        for i in 1..hop_count {
            let src = self.hops[i - 1].src_range.addr(sequence);
            let dst = self.hops[i].dst_range.addr(sequence);
            self.write_ip(&mut buf[offset..], src, dst, IpProtocol::Gre)?;
            offset += ip_header_size;
            self.write_gre(&mut buf[offset..])?;
            offset += gre_size;
        }
        let inner_src = self.hops[hop_count - 1].src_range.addr(sequence);
        self.write_ip(&mut buf[offset..], inner_src, self.local_addr, IpProtocol::Udp)?;
        offset += ip_header_size;
        self.write_udp(&mut buf[offset..], probe, inner_src)?;
        Ok(buf)
    }

    fn write_gre(&self, buf: &mut [u8]) -> ProbeResult<()> {
        let mut gre = GrePacket::new(buf)?;
        gre.set_flags_and_version(0);
        gre.set_protocol(match self.ip_version {
            IpVersion::V4 => EtherType::Ipv4,
            IpVersion::V6 => EtherType::Ipv6,
        });
        Ok(())
    }

    /// Write one IP header; `buf` extends to the end of the packet so the
    /// length field covers everything that follows.
    fn write_ip(
        &self,
        buf: &mut [u8],
        src: IpAddr,
        dst: IpAddr,
        protocol: IpProtocol,
    ) -> ProbeResult<()> {
        match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let total_length = buf.len() as u16;
                let mut ipv4 = Ipv4Packet::new(buf)?;
                ipv4.set_version(4);
                ipv4.set_header_length(5);
                ipv4.set_tos(self.tos.0);
                ipv4.set_total_length(total_length);
                ipv4.set_ttl(TTL);
                ipv4.set_protocol(protocol);
                ipv4.set_source(src);
                ipv4.set_destination(dst);
                let checksum = ipv4_header_checksum(ipv4.header());
                ipv4.set_checksum(checksum);
                Ok(())
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                let payload_length = (buf.len() - Ipv6Packet::minimum_packet_size()) as u16;
                let mut ipv6 = Ipv6Packet::new(buf)?;
                ipv6.set_version(6);
                ipv6.set_traffic_class(self.tos.0);
                ipv6.set_payload_length(payload_length);
                ipv6.set_next_header(protocol);
                ipv6.set_hop_limit(TTL);
                ipv6.set_source(src);
                ipv6.set_destination(dst);
                Ok(())
            }
            _ => Err(ProberError::BadConfig(format!(
                "address family mismatch: {src} -> {dst}"
            ))),
        }
    }

    /// Write the UDP header, probe record and padding payload, then the UDP
    /// checksum over the final inner IP pseudo-header.
    fn write_udp(&self, buf: &mut [u8], probe: &Probe, inner_src: IpAddr) -> ProbeResult<()> {
        let length = buf.len() as u16;
        {
            let mut udp = UdpPacket::new(buf)?;
            udp.set_source(self.port.0);
            udp.set_destination(self.port.0);
            udp.set_length(length);
        }
        let payload_offset = UdpPacket::minimum_packet_size();
        buf[payload_offset..payload_offset + PROBE_SIZE].copy_from_slice(&probe.encode());
        buf[payload_offset + PROBE_SIZE..].copy_from_slice(self.payload);
        let checksum = match (inner_src, self.local_addr) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => udp_ipv4_checksum(buf, src, dst),
            (IpAddr::V6(src), IpAddr::V6(dst)) => udp_ipv6_checksum(buf, src, dst),
            (src, dst) => {
                return Err(ProberError::BadConfig(format!(
                    "address family mismatch: {src} -> {dst}"
                )));
            }
        };
        let mut udp = UdpPacket::new(buf)?;
        udp.set_checksum(checksum);
        Ok(())
    }
}

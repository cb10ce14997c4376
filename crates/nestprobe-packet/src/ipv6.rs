use crate::buffer::Buffer;
use crate::error::{PacketError, Result};
use crate::{fmt_payload, IpProtocol};
use std::fmt::{Debug, Formatter};
use std::net::Ipv6Addr;

const VERSION_OFFSET: usize = 0;
const TRAFFIC_CLASS_OFFSET: usize = 0;
const FLOW_LABEL_OFFSET: usize = 1;
const PAYLOAD_LENGTH_OFFSET: usize = 4;
const NEXT_HEADER_OFFSET: usize = 6;
const HOP_LIMIT_OFFSET: usize = 7;
const SOURCE_OFFSET: usize = 8;
const DESTINATION_OFFSET: usize = 24;

/// Represents an `IPv6` packet.
///
/// The internal representation is held in network byte order (big-endian) and
/// all accessor methods take and return data in host byte order, converting as
/// necessary for the given architecture.
pub struct Ipv6Packet<'a> {
    buf: Buffer<'a>,
}

impl<'a> Ipv6Packet<'a> {
    pub fn new(packet: &'a mut [u8]) -> Result<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Mutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("Ipv6Packet"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    pub fn new_view(packet: &'a [u8]) -> Result<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Immutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("Ipv6Packet"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        40
    }

    #[must_use]
    pub fn get_version(&self) -> u8 {
        (self.buf.read(VERSION_OFFSET) & 0xf0) >> 4
    }

    #[must_use]
    pub fn get_traffic_class(&self) -> u8 {
        let b0 = self.buf.read(TRAFFIC_CLASS_OFFSET);
        let b1 = self.buf.read(TRAFFIC_CLASS_OFFSET + 1);
        (b0 << 4) | ((b1 & 0xf0) >> 4)
    }

    #[must_use]
    pub fn get_flow_label(&self) -> u32 {
        let bytes = self.buf.get_bytes::<3>(FLOW_LABEL_OFFSET);
        u32::from_be_bytes([0, bytes[0] & 0x0f, bytes[1], bytes[2]])
    }

    #[must_use]
    pub fn get_payload_length(&self) -> u16 {
        u16::from_be_bytes(self.buf.get_bytes(PAYLOAD_LENGTH_OFFSET))
    }

    #[must_use]
    pub fn get_next_header(&self) -> IpProtocol {
        IpProtocol::from(self.buf.read(NEXT_HEADER_OFFSET))
    }

    #[must_use]
    pub fn get_hop_limit(&self) -> u8 {
        self.buf.read(HOP_LIMIT_OFFSET)
    }

    #[must_use]
    pub fn get_source(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.buf.get_bytes::<16>(SOURCE_OFFSET))
    }

    #[must_use]
    pub fn get_destination(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.buf.get_bytes::<16>(DESTINATION_OFFSET))
    }

    pub fn set_version(&mut self, val: u8) {
        *self.buf.write(VERSION_OFFSET) =
            (self.buf.read(VERSION_OFFSET) & 0xf) | ((val & 0xf) << 4);
    }

    pub fn set_traffic_class(&mut self, val: u8) {
        *self.buf.write(TRAFFIC_CLASS_OFFSET) =
            (self.buf.read(TRAFFIC_CLASS_OFFSET) & 0xf0) | (val >> 4);
        *self.buf.write(TRAFFIC_CLASS_OFFSET + 1) =
            (self.buf.read(TRAFFIC_CLASS_OFFSET + 1) & 0x0f) | ((val & 0xf) << 4);
    }

    pub fn set_flow_label(&mut self, val: u32) {
        let bytes = val.to_be_bytes();
        *self.buf.write(FLOW_LABEL_OFFSET) =
            (self.buf.read(FLOW_LABEL_OFFSET) & 0xf0) | (bytes[1] & 0x0f);
        *self.buf.write(FLOW_LABEL_OFFSET + 1) = bytes[2];
        *self.buf.write(FLOW_LABEL_OFFSET + 2) = bytes[3];
    }

    pub fn set_payload_length(&mut self, val: u16) {
        self.buf.set_bytes(PAYLOAD_LENGTH_OFFSET, val.to_be_bytes());
    }

    pub fn set_next_header(&mut self, val: IpProtocol) {
        *self.buf.write(NEXT_HEADER_OFFSET) = val.id();
    }

    pub fn set_hop_limit(&mut self, val: u8) {
        *self.buf.write(HOP_LIMIT_OFFSET) = val;
    }

    pub fn set_source(&mut self, val: Ipv6Addr) {
        self.buf.set_bytes(SOURCE_OFFSET, val.octets());
    }

    pub fn set_destination(&mut self, val: Ipv6Addr) {
        self.buf.set_bytes(DESTINATION_OFFSET, val.octets());
    }

    pub fn set_payload(&mut self, vals: &[u8]) {
        let current_offset = Self::minimum_packet_size();
        self.buf.as_slice_mut()[current_offset..current_offset + vals.len()].copy_from_slice(vals);
    }

    #[must_use]
    pub fn packet(&self) -> &[u8] {
        self.buf.as_slice()
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buf.as_slice()[Self::minimum_packet_size()..]
    }
}

impl Debug for Ipv6Packet<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipv6Packet")
            .field("version", &self.get_version())
            .field("traffic_class", &self.get_traffic_class())
            .field("flow_label", &self.get_flow_label())
            .field("payload_length", &self.get_payload_length())
            .field("next_header", &self.get_next_header())
            .field("hop_limit", &self.get_hop_limit())
            .field("source", &self.get_source())
            .field("destination", &self.get_destination())
            .field("payload", &fmt_payload(self.payload()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::str::FromStr;

    #[test]
    fn test_version() {
        let mut buf = [0_u8; Ipv6Packet::minimum_packet_size()];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        packet.set_version(6);
        assert_eq!(6, packet.get_version());
        assert_eq!([0x60], packet.packet()[0..1]);
    }

    #[test]
    fn test_traffic_class() {
        let mut buf = [0_u8; Ipv6Packet::minimum_packet_size()];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        packet.set_version(6);
        packet.set_traffic_class(0xb8);
        assert_eq!(6, packet.get_version());
        assert_eq!(0xb8, packet.get_traffic_class());
        assert_eq!([0x6b, 0x80], packet.packet()[0..=1]);
    }

    #[test]
    fn test_flow_label_does_not_clobber_traffic_class() {
        let mut buf = [0_u8; Ipv6Packet::minimum_packet_size()];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        packet.set_traffic_class(0xff);
        packet.set_flow_label(0xfffff);
        assert_eq!(0xff, packet.get_traffic_class());
        assert_eq!(0xfffff, packet.get_flow_label());
    }

    #[test]
    fn test_payload_length() {
        let mut buf = [0_u8; Ipv6Packet::minimum_packet_size()];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        packet.set_payload_length(24);
        assert_eq!(24, packet.get_payload_length());
        assert_eq!([0x00, 0x18], packet.packet()[4..=5]);
    }

    #[test]
    fn test_next_header_and_hop_limit() {
        let mut buf = [0_u8; Ipv6Packet::minimum_packet_size()];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        packet.set_next_header(IpProtocol::Udp);
        packet.set_hop_limit(64);
        assert_eq!(IpProtocol::Udp, packet.get_next_header());
        assert_eq!(64, packet.get_hop_limit());
        assert_eq!([0x11, 0x40], packet.packet()[6..=7]);
    }

    #[test]
    fn test_addrs() {
        let mut buf = [0_u8; Ipv6Packet::minimum_packet_size()];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        let src = Ipv6Addr::from_str("2001:db8::").unwrap();
        let dest = Ipv6Addr::from_str("2001:db8::5").unwrap();
        packet.set_source(src);
        packet.set_destination(dest);
        assert_eq!(src, packet.get_source());
        assert_eq!(dest, packet.get_destination());
    }

    #[test]
    fn test_view() {
        let buf = hex!(
            "60 00 00 00 00 18 11 40
             20 01 0d b8 00 00 00 00 00 00 00 00 00 00 00 00
             20 01 0d b8 00 00 00 00 00 00 00 00 00 00 00 05"
        );
        let packet = Ipv6Packet::new_view(&buf).unwrap();
        assert_eq!(6, packet.get_version());
        assert_eq!(0, packet.get_traffic_class());
        assert_eq!(24, packet.get_payload_length());
        assert_eq!(IpProtocol::Udp, packet.get_next_header());
        assert_eq!(64, packet.get_hop_limit());
        assert_eq!(Ipv6Addr::from_str("2001:db8::").unwrap(), packet.get_source());
        assert_eq!(
            Ipv6Addr::from_str("2001:db8::5").unwrap(),
            packet.get_destination()
        );
    }

    #[test]
    fn test_new_insufficient_buffer() {
        const SIZE: usize = Ipv6Packet::minimum_packet_size();
        let mut buf = [0_u8; SIZE - 1];
        let err = Ipv6Packet::new(&mut buf).unwrap_err();
        assert_eq!(
            PacketError::InsufficientPacketBuffer(String::from("Ipv6Packet"), SIZE, SIZE - 1),
            err
        );
    }
}

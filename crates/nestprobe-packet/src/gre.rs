use crate::buffer::Buffer;
use crate::error::{PacketError, Result};
use crate::{fmt_payload, EtherType};
use std::fmt::{Debug, Formatter};

const FLAGS_AND_VERSION_OFFSET: usize = 0;
const PROTOCOL_OFFSET: usize = 2;

/// Represents a minimal `GRE` packet (RFC 2784).
///
/// Only the base four byte header is supported: no checksum, key or sequence
/// options are carried.  The `protocol` field holds the `EtherType` of the
/// encapsulated packet.
pub struct GrePacket<'a> {
    buf: Buffer<'a>,
}

impl<'a> GrePacket<'a> {
    pub fn new(packet: &'a mut [u8]) -> Result<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Mutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("GrePacket"),
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
                String::from("GrePacket"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        4
    }

    #[must_use]
    pub fn get_flags_and_version(&self) -> u16 {
        u16::from_be_bytes(self.buf.get_bytes(FLAGS_AND_VERSION_OFFSET))
    }

    #[must_use]
    pub fn get_protocol(&self) -> EtherType {
        EtherType::from(u16::from_be_bytes(self.buf.get_bytes(PROTOCOL_OFFSET)))
    }

    pub fn set_flags_and_version(&mut self, val: u16) {
        self.buf
            .set_bytes(FLAGS_AND_VERSION_OFFSET, val.to_be_bytes());
    }

    pub fn set_protocol(&mut self, val: EtherType) {
        self.buf.set_bytes(PROTOCOL_OFFSET, val.id().to_be_bytes());
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

impl Debug for GrePacket<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrePacket")
            .field("flags_and_version", &self.get_flags_and_version())
            .field("protocol", &self.get_protocol())
            .field("payload", &fmt_payload(self.payload()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_protocol() {
        let mut buf = [0_u8; GrePacket::minimum_packet_size()];
        let mut packet = GrePacket::new(&mut buf).unwrap();
        packet.set_protocol(EtherType::Ipv4);
        assert_eq!(EtherType::Ipv4, packet.get_protocol());
        assert_eq!([0x08, 0x00], packet.packet()[2..=3]);
        packet.set_protocol(EtherType::Ipv6);
        assert_eq!(EtherType::Ipv6, packet.get_protocol());
        assert_eq!([0x86, 0xDD], packet.packet()[2..=3]);
    }

    #[test]
    fn test_flags_and_version() {
        let mut buf = [0_u8; GrePacket::minimum_packet_size()];
        let mut packet = GrePacket::new(&mut buf).unwrap();
        packet.set_flags_and_version(0);
        assert_eq!(0, packet.get_flags_and_version());
        assert_eq!([0x00, 0x00], packet.packet()[0..=1]);
    }

    #[test]
    fn test_view() {
        let buf = hex!("00 00 86 dd");
        let packet = GrePacket::new_view(&buf).unwrap();
        assert_eq!(0, packet.get_flags_and_version());
        assert_eq!(EtherType::Ipv6, packet.get_protocol());
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_new_insufficient_buffer() {
        const SIZE: usize = GrePacket::minimum_packet_size();
        let mut buf = [0_u8; SIZE - 1];
        let err = GrePacket::new(&mut buf).unwrap_err();
        assert_eq!(
            PacketError::InsufficientPacketBuffer(String::from("GrePacket"), SIZE, SIZE - 1),
            err
        );
    }
}

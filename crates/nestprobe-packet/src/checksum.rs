//! Checksum implementations for IPv4 headers and UDP over IPv4 and IPv6.
//!
//! This code is derived from [`libpnet`] which is available under the Apache 2.0 license.
//!
//! [`libpnet`]: https://github.com/libpnet/libpnet

use crate::IpProtocol;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Calculate the checksum for an `IPv4` header.
#[must_use]
pub fn ipv4_header_checksum(data: &[u8]) -> u16 {
    if data.is_empty() {
        return 0;
    }
    finalize_checksum(sum_be_words(data, 5))
}

/// Calculate the checksum for an `IPv4` `UDP` packet.
#[must_use]
pub fn udp_ipv4_checksum(data: &[u8], src_addr: Ipv4Addr, dest_addr: Ipv4Addr) -> u16 {
    let mut sum = 0u32;
    sum += ipv4_word_sum(src_addr);
    sum += ipv4_word_sum(dest_addr);
    sum += u32::from(IpProtocol::Udp.id());
    sum += data.len() as u32;
    sum += sum_be_words(data, 3);
    finalize_checksum(sum)
}

/// Calculate the checksum for an `IPv6` `UDP` packet.
#[must_use]
pub fn udp_ipv6_checksum(data: &[u8], src_addr: Ipv6Addr, dest_addr: Ipv6Addr) -> u16 {
    let mut sum = 0u32;
    sum += ipv6_word_sum(src_addr);
    sum += ipv6_word_sum(dest_addr);
    sum += u32::from(IpProtocol::Udp.id());
    sum += data.len() as u32;
    sum += sum_be_words(data, 3);
    finalize_checksum(sum)
}

fn ipv4_word_sum(ip: Ipv4Addr) -> u32 {
    let octets = ip.octets();
    (((u32::from(octets[0])) << 8) | u32::from(octets[1]))
        + (((u32::from(octets[2])) << 8) | u32::from(octets[3]))
}

fn ipv6_word_sum(ip: Ipv6Addr) -> u32 {
    ip.segments().iter().map(|x| u32::from(*x)).sum()
}

/// Sum the big-endian 16 bit words of `data`, skipping the word at index
/// `ignore_word` (the checksum field itself).
fn sum_be_words(data: &[u8], ignore_word: usize) -> u32 {
    if data.is_empty() {
        return 0;
    }
    let len = data.len();
    let mut cur_data = data;
    let mut sum = 0u32;
    let mut i = 0;
    while cur_data.len() >= 2 {
        if i != ignore_word {
            sum += u32::from(u16::from_be_bytes(cur_data[0..2].try_into().unwrap()));
        }
        cur_data = &cur_data[2..];
        i += 1;
    }
    if i != ignore_word && len & 1 != 0 {
        sum += u32::from(data[len - 1]) << 8;
    }
    sum
}

const fn finalize_checksum(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }
    !sum as u16
}

//! IPv4/UDP envelope parsing and construction.
//!
//! Only the subset the firewall needs: inbound datagrams addressed to
//! port 53 are unwrapped, outbound replies are wrapped in a fresh
//! 20-byte IPv4 header and an 8-byte UDP header.

use std::net::Ipv4Addr;

/// Destination port claimed by the firewall.
pub const DNS_PORT: u16 = 53;

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const PROTOCOL_UDP: u8 = 17;
const DEFAULT_TTL: u8 = 64;
const FLAG_DONT_FRAGMENT: u16 = 0x4000;

/// A UDP/IPv4 datagram addressed to the DNS port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsDatagram {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl DnsDatagram {
    /// Parse a raw layer-3 packet read from the tunnel.
    ///
    /// Returns `None` for anything that is not a well-formed UDP/IPv4
    /// datagram to port 53. Such packets are not errors, the firewall
    /// simply does not own them.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < IPV4_HEADER_LEN {
            return None;
        }

        let version = raw[0] >> 4;
        if version != 4 {
            return None;
        }

        let header_len = ((raw[0] & 0x0F) as usize) * 4;
        if header_len < IPV4_HEADER_LEN {
            return None;
        }

        if raw[9] != PROTOCOL_UDP {
            return None;
        }

        if raw.len() < header_len + UDP_HEADER_LEN {
            return None;
        }

        let udp = &raw[header_len..];
        let src_port = u16::from_be_bytes([udp[0], udp[1]]);
        let dst_port = u16::from_be_bytes([udp[2], udp[3]]);
        if dst_port != DNS_PORT {
            return None;
        }

        let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
        if udp_len < UDP_HEADER_LEN || raw.len() < header_len + udp_len {
            return None;
        }

        Some(Self {
            src_ip: Ipv4Addr::new(raw[12], raw[13], raw[14], raw[15]),
            dst_ip: Ipv4Addr::new(raw[16], raw[17], raw[18], raw[19]),
            src_port,
            dst_port,
            payload: raw[header_len + UDP_HEADER_LEN..header_len + udp_len].to_vec(),
        })
    }

    /// Wrap `payload` as a reply to this datagram, with addresses and
    /// ports swapped.
    pub fn reply(&self, payload: &[u8]) -> Vec<u8> {
        encode(self.dst_ip, self.src_ip, self.dst_port, self.src_port, payload)
    }
}

/// Build a complete IPv4 + UDP packet around `payload`.
///
/// The UDP checksum is left at zero, which IPv4 permits.
pub fn encode(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let total_len = IPV4_HEADER_LEN + udp_len;
    let mut packet = Vec::with_capacity(total_len);

    // IPv4 header
    packet.push(0x45); // Version 4, IHL 5
    packet.push(0x00); // DSCP/ECN
    packet.extend_from_slice(&(total_len as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]); // Identification
    packet.extend_from_slice(&FLAG_DONT_FRAGMENT.to_be_bytes());
    packet.push(DEFAULT_TTL);
    packet.push(PROTOCOL_UDP);
    packet.extend_from_slice(&[0x00, 0x00]); // Checksum placeholder
    packet.extend_from_slice(&src_ip.octets());
    packet.extend_from_slice(&dst_ip.octets());

    // UDP header
    packet.extend_from_slice(&src_port.to_be_bytes());
    packet.extend_from_slice(&dst_port.to_be_bytes());
    packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]);

    packet.extend_from_slice(payload);

    let checksum = header_checksum(&packet[..IPV4_HEADER_LEN]);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// One's-complement checksum over an IPv4 header.
///
/// With the checksum field zeroed this yields the value to store; over a
/// header that already carries a valid checksum it yields zero.
pub fn header_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|word| match word {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => (*hi as u32) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_query_packet(dst_port: u16, payload: &[u8]) -> Vec<u8> {
        encode(
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(8, 8, 8, 8),
            40000,
            dst_port,
            payload,
        )
    }

    /// Straightforward RFC 1071 sum, kept separate from `header_checksum`.
    fn reference_sum(header: &[u8]) -> u16 {
        let mut sum: u64 = 0;
        let mut i = 0;
        while i + 1 < header.len() {
            sum += ((header[i] as u64) << 8) | header[i + 1] as u64;
            i += 2;
        }
        while sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        sum as u16
    }

    #[test]
    fn decode_extracts_addresses_ports_and_payload() {
        let raw = build_query_packet(53, b"hello");

        let datagram = DnsDatagram::decode(&raw).unwrap();

        assert_eq!(datagram.src_ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(datagram.dst_ip, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(datagram.src_port, 40000);
        assert_eq!(datagram.dst_port, 53);
        assert_eq!(datagram.payload, b"hello");
    }

    #[test]
    fn decode_ignores_trailing_bytes_beyond_udp_length() {
        let mut raw = build_query_packet(53, b"abc");
        raw.extend_from_slice(&[0xAA, 0xBB]);

        let datagram = DnsDatagram::decode(&raw).unwrap();

        assert_eq!(datagram.payload, b"abc");
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(DnsDatagram::decode(&[0x45; 19]).is_none());
        assert!(DnsDatagram::decode(&[]).is_none());
    }

    #[test]
    fn decode_rejects_ipv6() {
        let mut raw = build_query_packet(53, b"x");
        raw[0] = 0x60;

        assert!(DnsDatagram::decode(&raw).is_none());
    }

    #[test]
    fn decode_rejects_tcp() {
        let mut raw = build_query_packet(53, b"x");
        raw[9] = 6;

        assert!(DnsDatagram::decode(&raw).is_none());
    }

    #[test]
    fn decode_rejects_other_ports() {
        let raw = build_query_packet(443, b"x");

        assert!(DnsDatagram::decode(&raw).is_none());
    }

    #[test]
    fn decode_rejects_truncated_udp() {
        let raw = build_query_packet(53, b"0123456789");

        assert!(DnsDatagram::decode(&raw[..raw.len() - 3]).is_none());
    }

    #[test]
    fn decode_honours_ip_options() {
        let inner = build_query_packet(53, b"opt");
        // Rebuild with IHL = 6 and four bytes of options.
        let mut raw = inner[..20].to_vec();
        raw[0] = 0x46;
        raw.extend_from_slice(&[0x01, 0x01, 0x01, 0x00]);
        raw.extend_from_slice(&inner[20..]);

        let datagram = DnsDatagram::decode(&raw).unwrap();

        assert_eq!(datagram.payload, b"opt");
    }

    #[test]
    fn encode_writes_fixed_header_fields() {
        let packet = build_query_packet(53, &[1, 2, 3, 4]);

        assert_eq!(packet.len(), 20 + 8 + 4);
        assert_eq!(packet[0], 0x45);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 32);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 0x4000);
        assert_eq!(packet[8], 64);
        assert_eq!(packet[9], 17);
        assert_eq!(u16::from_be_bytes([packet[24], packet[25]]), 12);
        assert_eq!(&packet[26..28], &[0, 0]);
    }

    #[test]
    fn checksum_verifies_against_reference_sum() {
        let packet = build_query_packet(53, &[0u8; 300]);

        // Summing the header including its checksum must give 0xFFFF.
        assert_eq!(reference_sum(&packet[..20]), 0xFFFF);
        assert_eq!(header_checksum(&packet[..20]), 0);
    }

    #[test]
    fn checksum_matches_known_header() {
        // Example header from RFC 1071 style walkthroughs.
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];

        assert_eq!(header_checksum(&header), 0xb861);
    }

    #[test]
    fn reply_swaps_endpoints() {
        let raw = build_query_packet(53, b"q");
        let datagram = DnsDatagram::decode(&raw).unwrap();

        let reply = datagram.reply(b"r");

        assert_eq!(&reply[12..16], &[8, 8, 8, 8]);
        assert_eq!(&reply[16..20], &[10, 0, 0, 2]);
        assert_eq!(u16::from_be_bytes([reply[20], reply[21]]), 53);
        assert_eq!(u16::from_be_bytes([reply[22], reply[23]]), 40000);
        assert_eq!(&reply[28..], b"r");
    }
}

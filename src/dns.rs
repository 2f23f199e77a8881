//! DNS message inspection and NXDOMAIN synthesis.
//!
//! The firewall never fully parses messages: it only needs the first
//! question's name and a way to turn a query into a negative answer.

/// Length of the fixed DNS header.
pub const HEADER_LEN: usize = 12;
const POINTER_MASK: u8 = 0xC0;

/// Flags byte 2 of a blocked reply: QR=1, opcode 0, RD=1.
const REPLY_FLAGS_HI: u8 = 0x81;
/// Flags byte 3 of a blocked reply: RA=1, RCODE=3 (NXDOMAIN).
const REPLY_FLAGS_LO: u8 = 0x83;

/// RCODE value for NXDOMAIN.
pub const RCODE_NXDOMAIN: u8 = 3;

/// Returns the transaction ID of a DNS message.
pub fn transaction_id(message: &[u8]) -> Option<u16> {
    if message.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([message[0], message[1]]))
}

/// Extract the first question's name from a DNS message.
///
/// Labels are joined with `.` and lowercased. A single compression
/// pointer is followed; a second pointer ends the name. Returns `None`
/// if the message is truncated, a label is malformed, or no labels were
/// read.
pub fn extract_domain(message: &[u8]) -> Option<String> {
    if message.len() <= HEADER_LEN {
        return None;
    }

    let mut labels: Vec<String> = Vec::new();
    let mut pos = HEADER_LEN;
    let mut followed_pointer = false;

    loop {
        let len = *message.get(pos)?;
        if len == 0 {
            break;
        }

        if len & POINTER_MASK == POINTER_MASK {
            if followed_pointer {
                break;
            }
            let low = *message.get(pos + 1)?;
            pos = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
            followed_pointer = true;
            continue;
        }

        // 0x40 and 0x80 prefixes are reserved label types.
        if len & POINTER_MASK != 0 {
            return None;
        }

        let start = pos + 1;
        let end = start + len as usize;
        let label = message.get(start..end)?;
        labels.push(std::str::from_utf8(label).ok()?.to_ascii_lowercase());
        pos = end;
    }

    if labels.is_empty() {
        return None;
    }

    Some(labels.join("."))
}

/// Turn a query into an NXDOMAIN reply.
///
/// The transaction ID and question section are kept as-is; all record
/// counts after QDCOUNT are zeroed so any trailing sections are ignored
/// by the receiver. Returns `None` for input shorter than a DNS header.
pub fn blocked_reply(query: &[u8]) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let mut reply = query.to_vec();
    reply[2] = REPLY_FLAGS_HI;
    reply[3] = REPLY_FLAGS_LO;
    reply[6..HEADER_LEN].fill(0);

    Some(reply)
}

/// Returns the RCODE of a DNS message.
pub fn response_code(message: &[u8]) -> Option<u8> {
    message.get(3).map(|flags| flags & 0x0F)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a minimal A/IN query for `domain`.
    pub(crate) fn build_query(id: u16, domain: &str) -> Vec<u8> {
        let mut packet = Vec::with_capacity(512);

        packet.extend_from_slice(&id.to_be_bytes());
        packet.extend_from_slice(&[0x01, 0x00]); // Flags: standard query, RD
        packet.extend_from_slice(&[0x00, 0x01]); // Questions: 1
        packet.extend_from_slice(&[0x00, 0x00]); // Answer RRs
        packet.extend_from_slice(&[0x00, 0x00]); // Authority RRs
        packet.extend_from_slice(&[0x00, 0x00]); // Additional RRs

        for label in domain.split('.') {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0x00);

        packet.extend_from_slice(&[0x00, 0x01]); // Type: A
        packet.extend_from_slice(&[0x00, 0x01]); // Class: IN

        packet
    }

    #[test]
    fn extract_domain_reads_plain_labels() {
        let query = build_query(0x1234, "example.com");

        assert_eq!(extract_domain(&query).as_deref(), Some("example.com"));
    }

    #[test]
    fn extract_domain_lowercases() {
        let query = build_query(1, "WWW.Example.COM");

        assert_eq!(extract_domain(&query).as_deref(), Some("www.example.com"));
    }

    fn header(id: u16) -> Vec<u8> {
        let mut message = build_query(id, "a");
        message.truncate(HEADER_LEN);
        message
    }

    #[test]
    fn extract_domain_follows_compression_pointer() {
        let plain = build_query(7, "example.com");
        let mut message = header(7);
        message.extend_from_slice(&[0xC0, 16, 0x00, 0x00]); // 12: pointer to 16
        message.push(7);
        message.extend_from_slice(b"example");
        message.push(3);
        message.extend_from_slice(b"com");
        message.push(0);

        assert_eq!(extract_domain(&message), extract_domain(&plain));
    }

    #[test]
    fn extract_domain_mixes_labels_and_pointer() {
        let mut message = header(9);
        message.push(3);
        message.extend_from_slice(b"www");
        message.extend_from_slice(&[0xC0, 22]); // 16: pointer to 22
        message.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        message.push(7);
        message.extend_from_slice(b"example");
        message.push(3);
        message.extend_from_slice(b"com");
        message.push(0);

        assert_eq!(extract_domain(&message).as_deref(), Some("www.example.com"));
    }

    #[test]
    fn extract_domain_does_not_chain_pointers() {
        let mut message = header(1);
        message.extend_from_slice(&[0xC0, 20, 0, 0, 0, 0, 0, 0]); // 12: pointer to 20
        message.extend_from_slice(&[0xC0, 12]); // 20: pointer back to 12

        assert_eq!(extract_domain(&message), None);
    }

    #[test]
    fn extract_domain_keeps_labels_read_before_second_pointer() {
        let mut message = header(1);
        message.extend_from_slice(&[0xC0, 16, 0, 0]); // 12: pointer to 16
        message.push(3);
        message.extend_from_slice(b"abc");
        message.extend_from_slice(&[0xC0, 12]); // 20: not followed

        assert_eq!(extract_domain(&message).as_deref(), Some("abc"));
    }

    #[test]
    fn extract_domain_rejects_truncated_label() {
        let query = build_query(1, "example.com");

        assert_eq!(extract_domain(&query[..16]), None);
    }

    #[test]
    fn extract_domain_rejects_pointer_out_of_range() {
        let mut message = build_query(1, "a.b");
        message[12] = 0xC0;
        message[13] = 0xFF;

        assert_eq!(extract_domain(&message), None);
    }

    #[test]
    fn extract_domain_rejects_header_only_and_root() {
        assert_eq!(extract_domain(&[0u8; 12]), None);
        assert_eq!(extract_domain(&[0u8; 4]), None);

        let mut root = header(1);
        root.push(0);
        assert_eq!(extract_domain(&root), None);
    }

    #[test]
    fn blocked_reply_sets_nxdomain_and_keeps_question() {
        let mut query = build_query(0xBEEF, "ads.example.com");
        query[11] = 1; // pretend an OPT record was announced

        let reply = blocked_reply(&query).unwrap();

        assert_eq!(transaction_id(&reply), Some(0xBEEF));
        assert_eq!(reply[2], 0x81);
        assert_eq!(reply[3], 0x83);
        assert_eq!(response_code(&reply), Some(RCODE_NXDOMAIN));
        assert_eq!(&reply[4..6], &[0, 1]);
        assert_eq!(&reply[6..12], &[0; 6]);
        assert_eq!(&reply[12..], &query[12..]);
        assert_eq!(extract_domain(&reply).as_deref(), Some("ads.example.com"));
    }

    #[test]
    fn blocked_reply_refuses_input_shorter_than_header() {
        assert_eq!(blocked_reply(&[1, 2, 3]), None);
        assert_eq!(blocked_reply(&[0u8; HEADER_LEN - 1]), None);
        assert!(blocked_reply(&[0u8; HEADER_LEN]).is_some());
    }
}

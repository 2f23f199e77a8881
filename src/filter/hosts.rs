//! Hosts-file and plain domain-list parsing for blocklist imports.

const SINK_ADDRESSES: [&str; 2] = ["0.0.0.0", "127.0.0.1"];

/// Parse one line of a hosts file or domain list.
///
/// Accepts `0.0.0.0 domain`, `127.0.0.1 domain` and bare `domain`
/// lines; trailing tokens such as inline comments are ignored. Returns
/// the lowercased domain, or `None` for comments, blanks and entries
/// that are not plausible domain names.
pub fn parse_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let first = tokens.next()?;

    let candidate = if SINK_ADDRESSES.iter().any(|addr| first.starts_with(addr)) {
        tokens.next()?
    } else {
        first
    };

    let domain = candidate.to_ascii_lowercase();
    is_valid_domain(&domain).then_some(domain)
}

/// Parse a whole list, skipping lines that do not yield a domain.
pub fn parse_list(text: &str) -> Vec<String> {
    text.lines().filter_map(parse_line).collect()
}

/// Basic sanity check for an imported, already lowercased domain.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain == "localhost" || domain == "local" {
        return false;
    }
    if domain.starts_with("0.0.0.0") || domain.starts_with("127.") {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }

    let bytes = domain.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }

    bytes
        .iter()
        .all(|&b| edge_ok(b) || b == b'.' || b == b'-')
}

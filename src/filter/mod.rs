//! Static blocklist filtering.
//!
//! Holds the in-memory snapshot used on the hot path plus the helpers
//! that turn user and list input into normalized entries.

mod blocklist;
pub mod defaults;
pub mod download;
pub mod hosts;

pub use blocklist::Blocklist;

/// Normalize a queried or stored domain: lowercase, no trailing dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

/// Normalize a domain typed by a user, which may be pasted as a URL.
///
/// Strips the scheme, a leading `www.`, any path, and a trailing dot.
pub fn normalize_user_domain(input: &str) -> String {
    let lower = input.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))
        .unwrap_or(&lower);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let host = rest.split('/').next().unwrap_or_default();

    normalize_domain(host)
}

/// Every dot-separated suffix of `domain`, starting with the full name.
pub fn suffixes(domain: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(domain);
    std::iter::from_fn(move || {
        let current = next?;
        next = current.find('.').map(|pos| &current[pos + 1..]);
        Some(current)
    })
}

//! Immutable blocklist snapshot.
//!
//! Built wholesale from the store and swapped as a unit; lookups never
//! take a lock.

use rustc_hash::FxHashSet;

use super::{normalize_domain, suffixes};

const WILDCARD_PREFIX: &str = "*.";

/// A set of blocked domains and `*.` wildcard entries.
#[derive(Debug, Default, Clone)]
pub struct Blocklist {
    domains: FxHashSet<String>,
}

impl Blocklist {
    /// Build a snapshot from normalized entries.
    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a domain should be blocked.
    ///
    /// Matches the exact name, any dot-separated parent, and any `*.`
    /// wildcard entry for the name or one of its parents. A wildcard
    /// entry `*.example.com` therefore also blocks `example.com` itself.
    pub fn is_blocked(&self, domain: &str) -> bool {
        if self.domains.is_empty() {
            return false;
        }

        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return false;
        }

        if self.domains.contains(domain.as_str()) {
            return true;
        }

        let mut wildcard = String::with_capacity(domain.len() + WILDCARD_PREFIX.len());
        for suffix in suffixes(&domain) {
            if self.domains.contains(suffix) {
                return true;
            }

            wildcard.clear();
            wildcard.push_str(WILDCARD_PREFIX);
            wildcard.push_str(suffix);
            if self.domains.contains(wildcard.as_str()) {
                return true;
            }
        }

        false
    }

    /// Returns the number of entries in the snapshot.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

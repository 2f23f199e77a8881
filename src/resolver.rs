//! DNS query decision logic.
//!
//! Handles the core query processing pipeline:
//! 1. Drop payloads too short to be DNS, extract the queried name
//! 2. Static blocklist snapshot
//! 3. Time rules
//! 4. Decide whether to forward or answer with NXDOMAIN
//!
//! The intercept loop handles the I/O, the resolver handles decisions.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use arc_swap::ArcSwap;
use tracing::{debug, error, info, warn};

use crate::dns::{HEADER_LEN, blocked_reply, extract_domain};
use crate::filter::Blocklist;
use crate::rules::TimeRuleEngine;
use crate::store::{BlocklistStore, StoreError};

/// Why a query was answered locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Static blocklist hit.
    List,
    /// A time rule said block.
    Rule,
    /// The rule store failed; fail closed.
    StoreError,
    /// The name could not be parsed and parse failures fail closed.
    Unparseable,
}

/// Action to take for a DNS query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryAction {
    /// Query is blocked, return this response immediately.
    Blocked {
        response: Vec<u8>,
        domain: String,
        reason: BlockReason,
    },
    /// Query should be forwarded to upstream.
    Forward { domain: String },
    /// Not answerable at all; nothing is sent back.
    Drop,
}

const UNKNOWN_DOMAIN: &str = "<unknown>";

/// Resolver handles DNS query processing decisions.
///
/// Owns the current blocklist snapshot. `refresh_snapshot` may run while
/// queries are being processed; each query sees either the old or the new
/// snapshot as a whole.
pub struct Resolver {
    blocklist: ArcSwap<Blocklist>,
    sites: Arc<dyn BlocklistStore>,
    rules: TimeRuleEngine,
    fail_closed_on_parse_error: bool,
    /// Store data version the current snapshot was loaded at.
    loaded_version: AtomicI64,
}

impl Resolver {
    /// Create a resolver with an empty snapshot. Call `refresh_snapshot`
    /// to load the blocklist.
    pub fn new(sites: Arc<dyn BlocklistStore>, rules: TimeRuleEngine) -> Self {
        Self {
            blocklist: ArcSwap::from_pointee(Blocklist::default()),
            sites,
            rules,
            fail_closed_on_parse_error: false,
            loaded_version: AtomicI64::new(i64::MIN),
        }
    }

    pub fn with_fail_closed_on_parse_error(mut self, fail_closed: bool) -> Self {
        self.fail_closed_on_parse_error = fail_closed;
        self
    }

    /// Reload the blocklist from the store and swap it in.
    ///
    /// On error the previous snapshot stays active.
    pub fn refresh_snapshot(&self) -> Result<usize, StoreError> {
        let version = self.sites.data_version()?;
        let domains = self.sites.enabled_domains()?;
        let blocklist = Blocklist::from_domains(domains);
        let len = blocklist.len();
        self.blocklist.store(Arc::new(blocklist));
        self.loaded_version.store(version, Ordering::Release);
        info!("Blocklist snapshot refreshed: {} entries", len);
        Ok(len)
    }

    /// Refresh only when the store was written to since the last load.
    ///
    /// Returns the new entry count, or `None` when nothing changed.
    pub fn refresh_if_changed(&self) -> Result<Option<usize>, StoreError> {
        if self.sites.data_version()? == self.loaded_version.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.refresh_snapshot().map(Some)
    }

    /// Process a DNS query and decide what action to take.
    ///
    /// May touch the rule store, so callers on an async runtime should run
    /// this on a blocking thread.
    pub fn process_query(&self, query: &[u8]) -> QueryAction {
        if query.len() < HEADER_LEN {
            debug!("Dropping {} byte payload", query.len());
            return QueryAction::Drop;
        }

        let Some(domain) = extract_domain(query) else {
            if self.fail_closed_on_parse_error {
                return blocked(query, UNKNOWN_DOMAIN.to_string(), BlockReason::Unparseable);
            }
            debug!("Forwarding unparseable query");
            return QueryAction::Forward {
                domain: UNKNOWN_DOMAIN.to_string(),
            };
        };

        // Step 1: static blocklist
        if self.blocklist.load().is_blocked(&domain) {
            return blocked(query, domain, BlockReason::List);
        }

        // Step 2: time rules
        match self.rules.evaluate(&domain) {
            Ok(true) => blocked(query, domain, BlockReason::Rule),
            Ok(false) => QueryAction::Forward { domain },
            Err(e) => {
                error!("Time rule evaluation failed for {}: {}", domain, e);
                blocked(query, domain, BlockReason::StoreError)
            }
        }
    }

    /// Returns the number of entries in the current snapshot.
    pub fn blocked_count(&self) -> usize {
        self.blocklist.load().len()
    }

    pub fn rules(&self) -> &TimeRuleEngine {
        &self.rules
    }
}

fn blocked(query: &[u8], domain: String, reason: BlockReason) -> QueryAction {
    if reason == BlockReason::Unparseable {
        warn!("Blocking unparseable query");
    }
    match blocked_reply(query) {
        Some(response) => QueryAction::Blocked {
            response,
            domain,
            reason,
        },
        None => QueryAction::Drop,
    }
}

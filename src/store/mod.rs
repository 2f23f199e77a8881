//! Persistent storage for blocklist entries, custom lists and time rules.
//!
//! The decision path only sees the [`BlocklistStore`] and [`RuleStore`]
//! traits; [`SqliteStore`] is the on-device implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::NaiveDate;
use thiserror::Error;

use crate::rules::{BlockedSite, TimeRule, Usage};

/// Errors raised by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: i64, reason: String },
}

/// Read side of the blocklist used by the firewall.
pub trait BlocklistStore: Send + Sync {
    /// All enabled entries, normalized.
    fn enabled_domains(&self) -> Result<Vec<String>, StoreError>;

    /// Look up an entry by exact domain, enabled or not.
    fn site_by_domain(&self, domain: &str) -> Result<Option<BlockedSite>, StoreError>;

    /// A value that changes whenever another writer commits to the store.
    fn data_version(&self) -> Result<i64, StoreError>;
}

/// Time rule storage, including the usage counters the engine updates.
pub trait RuleStore: Send + Sync {
    fn enabled_rules(&self) -> Result<Vec<TimeRule>, StoreError>;

    /// Current usage of a rule, `None` if the rule no longer exists.
    fn usage(&self, rule_id: i64) -> Result<Option<Usage>, StoreError>;

    fn update_usage_and_timestamp(
        &self,
        rule_id: i64,
        minutes: u32,
        timestamp_ms: i64,
    ) -> Result<(), StoreError>;

    /// Zero every rule's usage and clear its last query timestamp.
    fn reset_daily_usage(&self, today: NaiveDate) -> Result<(), StoreError>;
}

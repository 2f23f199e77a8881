use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Timelike, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{info, warn};

use super::{BlocklistStore, RuleStore, StoreError};
use crate::filter::defaults::{default_domains, enabled_by_default};
use crate::filter::normalize_domain;
use crate::rules::{
    BlockedSite, Category, CustomList, Days, RuleKind, RuleTarget, TimeRule, Usage,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blocked_sites (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain TEXT NOT NULL UNIQUE,
        category TEXT NOT NULL,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        is_custom INTEGER NOT NULL DEFAULT 0,
        custom_list_id INTEGER,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sites_list ON blocked_sites(custom_list_id);
    CREATE INDEX IF NOT EXISTS idx_sites_category ON blocked_sites(category);

    CREATE TABLE IF NOT EXISTS custom_lists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        is_enabled INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS time_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain TEXT,
        category TEXT,
        custom_list_id INTEGER,
        action TEXT NOT NULL,
        daily_limit_minutes INTEGER,
        start_hour INTEGER,
        start_minute INTEGER,
        end_hour INTEGER,
        end_minute INTEGER,
        days_of_week TEXT NOT NULL DEFAULT '1,2,3,4,5,6,7',
        is_enabled INTEGER NOT NULL DEFAULT 1,
        used_minutes_today INTEGER NOT NULL DEFAULT 0,
        last_reset_date TEXT,
        last_query_timestamp INTEGER
    );
";

const SITE_COLUMNS: &str =
    "id, domain, category, is_enabled, is_custom, custom_list_id, created_at";

const RULE_COLUMNS: &str = "id, domain, category, custom_list_id, action, daily_limit_minutes,
    start_hour, start_minute, end_hour, end_minute, days_of_week, is_enabled,
    used_minutes_today, last_reset_date, last_query_timestamp";

/// SQLite-backed store.
///
/// A single connection behind a mutex; every operation is short and the
/// per-rule usage update is a single statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self::init(conn)?;
        info!("SQLite store opened at {}", path.as_ref().display());
        Ok(store)
    }

    /// A private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Add a custom entry. Returns `false` if the domain is already stored.
    pub fn add_custom_site(&self, domain: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blocked_sites (domain, category, is_enabled, is_custom, created_at)
             VALUES (?1, ?2, 1, 1, ?3)",
            params![domain, Category::Custom.as_str(), now_ms()],
        )?;
        Ok(inserted > 0)
    }

    /// Remove an entry by domain. Returns `false` if nothing was stored.
    pub fn remove_site(&self, domain: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM blocked_sites WHERE domain = ?1", [domain])?;
        Ok(removed > 0)
    }

    /// Replace the non-custom entries of a category with `domains`.
    ///
    /// Custom entries that share a domain are overwritten; the whole
    /// import is one transaction.
    pub fn replace_category_sites(
        &self,
        category: Category,
        domains: &[String],
        enabled: bool,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM blocked_sites WHERE category = ?1 AND is_custom = 0",
            [category.as_str()],
        )?;

        let count = insert_sites(&tx, category, domains, enabled, "INSERT OR REPLACE")?;
        tx.commit()?;

        info!("Stored {} domains for category {}", count, category);
        Ok(count)
    }

    /// Put a category back to its built-in entries. Custom entries stay.
    pub fn reset_category(&self, category: Category) -> Result<usize, StoreError> {
        self.replace_category_sites(
            category,
            &default_domains(category),
            enabled_by_default(category),
        )
    }

    /// Store every category's built-in entries, but only while nothing is
    /// enabled yet. Returns how many entries were added.
    pub fn seed_default_blocklists(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let in_use: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocked_sites WHERE is_enabled = 1)",
            [],
            |row| row.get(0),
        )?;
        if in_use {
            return Ok(0);
        }

        let mut count = 0;
        for category in Category::ALL {
            count += insert_sites(
                &tx,
                category,
                &default_domains(category),
                enabled_by_default(category),
                "INSERT OR IGNORE",
            )?;
        }
        tx.commit()?;

        info!("Seeded {} default blocklist entries", count);
        Ok(count)
    }

    pub fn set_category_enabled(&self, category: Category, enabled: bool) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "UPDATE blocked_sites SET is_enabled = ?1 WHERE category = ?2",
            params![enabled, category.as_str()],
        )?)
    }

    pub fn create_list(&self, name: &str, description: &str) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO custom_lists (name, description, is_enabled, created_at) VALUES (?1, ?2, 1, ?3)",
            params![name, description, now_ms()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list(&self, list_id: i64) -> Result<Option<CustomList>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, description, is_enabled FROM custom_lists WHERE id = ?1",
                [list_id],
                |row| {
                    Ok(CustomList {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        enabled: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Add a domain to a list. Returns `false` if it is already a member.
    ///
    /// A domain stored elsewhere is moved into the list.
    pub fn add_domain_to_list(&self, list_id: i64, domain: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let existing: Option<Option<i64>> = conn
            .query_row(
                "SELECT custom_list_id FROM blocked_sites WHERE domain = ?1",
                [domain],
                |row| row.get(0),
            )
            .optional()?;
        if existing == Some(Some(list_id)) {
            return Ok(false);
        }

        conn.execute(
            "INSERT OR REPLACE INTO blocked_sites
                (domain, category, is_enabled, is_custom, custom_list_id, created_at)
             VALUES (?1, ?2, 1, 1, ?3, ?4)",
            params![domain, Category::Custom.as_str(), list_id, now_ms()],
        )?;
        Ok(true)
    }

    /// Enable or disable a list together with all of its member domains.
    pub fn set_list_enabled(&self, list_id: i64, enabled: bool) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE custom_lists SET is_enabled = ?1 WHERE id = ?2",
            params![enabled, list_id],
        )?;
        tx.execute(
            "UPDATE blocked_sites SET is_enabled = ?1 WHERE custom_list_id = ?2",
            params![enabled, list_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a list and every domain it owns.
    pub fn delete_list(&self, list_id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM blocked_sites WHERE custom_list_id = ?1", [list_id])?;
        tx.execute("DELETE FROM custom_lists WHERE id = ?1", [list_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Store a new rule and return its id.
    pub fn add_rule(&self, rule: &TimeRule) -> Result<i64, StoreError> {
        let (domain, category, list_id) = match &rule.target {
            RuleTarget::All => (None, None, None),
            RuleTarget::Domain(d) => (Some(normalize_domain(d)), None, None),
            RuleTarget::Category(c) => (None, Some(c.as_str()), None),
            RuleTarget::List(id) => (None, None, Some(*id)),
        };
        let (limit, start, end) = match rule.kind {
            RuleKind::Quota { daily_limit_minutes } => (Some(daily_limit_minutes), None, None),
            RuleKind::Schedule { start, end } => (None, Some(start), Some(end)),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO time_rules (
                domain, category, custom_list_id, action, daily_limit_minutes,
                start_hour, start_minute, end_hour, end_minute, days_of_week, is_enabled
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                domain,
                category,
                list_id,
                rule.action.as_str(),
                limit,
                start.map(|t| t.hour()),
                start.map(|t| t.minute()),
                end.map(|t| t.hour()),
                end.map(|t| t.minute()),
                rule.days.to_string(),
                rule.enabled,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_rule_enabled(&self, rule_id: i64, enabled: bool) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE time_rules SET is_enabled = ?1 WHERE id = ?2",
            params![enabled, rule_id],
        )?;
        Ok(updated > 0)
    }
}

impl BlocklistStore for SqliteStore {
    fn enabled_domains(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT domain FROM blocked_sites WHERE is_enabled = 1")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut domains = Vec::new();
        for domain in rows {
            domains.push(normalize_domain(&domain?));
        }
        Ok(domains)
    }

    fn site_by_domain(&self, domain: &str) -> Result<Option<BlockedSite>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM blocked_sites WHERE domain = ?1 LIMIT 1",
            SITE_COLUMNS
        ))?;
        let raw = stmt.query_row([domain], RawSite::from_row).optional()?;
        raw.map(RawSite::into_site).transpose()
    }

    /// SQLite's `data_version`: bumped by commits from other connections,
    /// including other processes, never by this one.
    fn data_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }
}

impl RuleStore for SqliteStore {
    fn enabled_rules(&self) -> Result<Vec<TimeRule>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM time_rules WHERE is_enabled = 1 ORDER BY id ASC",
            RULE_COLUMNS
        ))?;
        let rows = stmt.query_map([], RawRule::from_row)?;

        let mut rules = Vec::new();
        for raw in rows {
            match raw?.into_rule() {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("Skipping time rule: {}", e),
            }
        }
        Ok(rules)
    }

    fn usage(&self, rule_id: i64) -> Result<Option<Usage>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT used_minutes_today, last_reset_date, last_query_timestamp
             FROM time_rules WHERE id = ?1",
        )?;
        let raw = stmt
            .query_row([rule_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })
            .optional()?;

        raw.map(|(used, reset, last)| usage_from_columns(rule_id, used, reset, last))
            .transpose()
    }

    fn update_usage_and_timestamp(
        &self,
        rule_id: i64,
        minutes: u32,
        timestamp_ms: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.prepare_cached(
            "UPDATE time_rules SET used_minutes_today = ?1, last_query_timestamp = ?2 WHERE id = ?3",
        )?
        .execute(params![minutes, timestamp_ms, rule_id])?;
        Ok(())
    }

    fn reset_daily_usage(&self, today: NaiveDate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let reset = conn.execute(
            "UPDATE time_rules
             SET used_minutes_today = 0, last_reset_date = ?1, last_query_timestamp = NULL",
            [today.format(DATE_FORMAT).to_string()],
        )?;
        info!("Reset daily usage for {} time rules", reset);
        Ok(())
    }
}

struct RawSite {
    id: i64,
    domain: String,
    category: String,
    enabled: bool,
    custom: bool,
    custom_list_id: Option<i64>,
    created_at: i64,
}

impl RawSite {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            domain: row.get(1)?,
            category: row.get(2)?,
            enabled: row.get(3)?,
            custom: row.get(4)?,
            custom_list_id: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_site(self) -> Result<BlockedSite, StoreError> {
        let category = self
            .category
            .parse()
            .map_err(|reason| StoreError::InvalidRecord { id: self.id, reason })?;
        Ok(BlockedSite {
            id: self.id,
            domain: self.domain,
            category,
            enabled: self.enabled,
            custom: self.custom,
            custom_list_id: self.custom_list_id,
            created_at: self.created_at,
        })
    }
}

struct RawRule {
    id: i64,
    domain: Option<String>,
    category: Option<String>,
    custom_list_id: Option<i64>,
    action: String,
    daily_limit_minutes: Option<i64>,
    start_hour: Option<u32>,
    start_minute: Option<u32>,
    end_hour: Option<u32>,
    end_minute: Option<u32>,
    days_of_week: String,
    enabled: bool,
    used_minutes_today: i64,
    last_reset_date: Option<String>,
    last_query_timestamp: Option<i64>,
}

impl RawRule {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            domain: row.get(1)?,
            category: row.get(2)?,
            custom_list_id: row.get(3)?,
            action: row.get(4)?,
            daily_limit_minutes: row.get(5)?,
            start_hour: row.get(6)?,
            start_minute: row.get(7)?,
            end_hour: row.get(8)?,
            end_minute: row.get(9)?,
            days_of_week: row.get(10)?,
            enabled: row.get(11)?,
            used_minutes_today: row.get(12)?,
            last_reset_date: row.get(13)?,
            last_query_timestamp: row.get(14)?,
        })
    }

    fn into_rule(self) -> Result<TimeRule, StoreError> {
        let id = self.id;
        let invalid = |reason: String| StoreError::InvalidRecord { id, reason };

        let target = match (self.domain, self.category, self.custom_list_id) {
            (None, None, None) => RuleTarget::All,
            (Some(domain), None, None) => RuleTarget::Domain(normalize_domain(&domain)),
            (None, Some(category), None) => RuleTarget::Category(category.parse().map_err(invalid)?),
            (None, None, Some(list_id)) => RuleTarget::List(list_id),
            _ => return Err(invalid("more than one target set".to_string())),
        };

        let window = match (self.start_hour, self.end_hour) {
            (Some(sh), Some(eh)) => Some((
                time_of_day(sh, self.start_minute.unwrap_or(0)).ok_or_else(|| invalid("bad start time".into()))?,
                time_of_day(eh, self.end_minute.unwrap_or(0)).ok_or_else(|| invalid("bad end time".into()))?,
            )),
            _ => None,
        };

        let kind = match (window, self.daily_limit_minutes) {
            (Some((start, end)), None) => RuleKind::Schedule { start, end },
            (None, Some(limit)) => RuleKind::Quota {
                daily_limit_minutes: u32::try_from(limit)
                    .map_err(|_| invalid(format!("negative daily limit {}", limit)))?,
            },
            (Some(_), Some(_)) => return Err(invalid("both window and daily limit set".to_string())),
            (None, None) => return Err(invalid("neither window nor daily limit set".to_string())),
        };

        Ok(TimeRule {
            id,
            target,
            action: self.action.parse().map_err(invalid)?,
            kind,
            days: self.days_of_week.parse::<Days>().map_err(invalid)?,
            enabled: self.enabled,
            usage: usage_from_columns(
                id,
                self.used_minutes_today,
                self.last_reset_date,
                self.last_query_timestamp,
            )?,
        })
    }
}

fn usage_from_columns(
    id: i64,
    used: i64,
    last_reset_date: Option<String>,
    last_query_ms: Option<i64>,
) -> Result<Usage, StoreError> {
    let last_reset_date = last_reset_date
        .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
        .transpose()
        .map_err(|e| StoreError::InvalidRecord {
            id,
            reason: format!("bad reset date: {}", e),
        })?;

    Ok(Usage {
        used_minutes_today: u32::try_from(used).unwrap_or(0),
        last_reset_date,
        last_query_ms,
    })
}

/// Insert non-custom entries for a category; `verb` picks the conflict policy.
fn insert_sites(
    tx: &Transaction<'_>,
    category: Category,
    domains: &[String],
    enabled: bool,
    verb: &str,
) -> Result<usize, StoreError> {
    let created_at = now_ms();
    let mut stmt = tx.prepare_cached(&format!(
        "{} INTO blocked_sites (domain, category, is_enabled, is_custom, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        verb
    ))?;

    let mut count = 0;
    for domain in domains {
        count += stmt.execute(params![domain, category.as_str(), enabled, created_at])?;
    }
    Ok(count)
}

fn time_of_day(hour: u32, minute: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleAction;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn enabled_domains_skips_disabled_and_normalizes() {
        let store = store();
        store
            .replace_category_sites(Category::Adult, &["a.com".into(), "B.com.".into()], true)
            .unwrap();
        store
            .replace_category_sites(Category::Gambling, &["bet.com".into()], false)
            .unwrap();

        let mut domains = store.enabled_domains().unwrap();
        domains.sort();

        assert_eq!(domains, vec!["a.com", "b.com"]);
    }

    #[test]
    fn replace_category_sites_keeps_custom_entries() {
        let store = store();
        store.add_custom_site("mine.com").unwrap();
        store
            .replace_category_sites(Category::Malware, &["old.com".into()], true)
            .unwrap();
        store
            .replace_category_sites(Category::Malware, &["new.com".into()], true)
            .unwrap();

        assert!(store.site_by_domain("old.com").unwrap().is_none());
        assert!(store.site_by_domain("new.com").unwrap().is_some());
        assert!(store.site_by_domain("mine.com").unwrap().is_some());
    }

    #[test]
    fn seed_default_blocklists_only_fills_an_unused_store() {
        let store = store();

        let seeded = store.seed_default_blocklists().unwrap();
        assert!(seeded > 0);
        assert_eq!(store.seed_default_blocklists().unwrap(), 0);

        let enabled = store.enabled_domains().unwrap();
        assert!(enabled.contains(&"bet365.com".to_string()));
        assert!(!enabled.contains(&"youtube.com".to_string()));
        let social = store.site_by_domain("youtube.com").unwrap().unwrap();
        assert_eq!(social.category, Category::SocialMedia);
        assert!(!social.enabled);
        assert!(!social.custom);
    }

    #[test]
    fn seed_default_blocklists_skips_store_with_enabled_entries() {
        let store = store();
        store.add_custom_site("mine.com").unwrap();

        assert_eq!(store.seed_default_blocklists().unwrap(), 0);
        assert_eq!(store.enabled_domains().unwrap(), vec!["mine.com"]);
    }

    #[test]
    fn reset_category_restores_defaults_and_keeps_custom() {
        let store = store();
        store.add_custom_site("mine.com").unwrap();
        store
            .replace_category_sites(Category::Gambling, &["downloaded.bet".into()], true)
            .unwrap();

        let stored = store.reset_category(Category::Gambling).unwrap();

        assert_eq!(stored, default_domains(Category::Gambling).len());
        assert!(store.site_by_domain("downloaded.bet").unwrap().is_none());
        assert!(store.site_by_domain("*.stake.com").unwrap().unwrap().enabled);
        assert!(store.site_by_domain("mine.com").unwrap().is_some());
    }

    #[test]
    fn add_custom_site_rejects_duplicates() {
        let store = store();

        assert!(store.add_custom_site("example.com").unwrap());
        assert!(!store.add_custom_site("example.com").unwrap());

        let site = store.site_by_domain("example.com").unwrap().unwrap();
        assert_eq!(site.category, Category::Custom);
        assert!(site.custom);
        assert!(site.enabled);
    }

    #[test]
    fn remove_site_reports_whether_anything_was_deleted() {
        let store = store();
        store.add_custom_site("example.com").unwrap();

        assert!(store.remove_site("example.com").unwrap());
        assert!(!store.remove_site("example.com").unwrap());
    }

    #[test]
    fn set_category_enabled_toggles_entries() {
        let store = store();
        store
            .replace_category_sites(Category::SocialMedia, &["tiktok.com".into()], false)
            .unwrap();

        store.set_category_enabled(Category::SocialMedia, true).unwrap();

        assert_eq!(store.enabled_domains().unwrap(), vec!["tiktok.com"]);
    }

    #[test]
    fn list_membership_and_cascade_disable() {
        let store = store();
        let list = store.create_list("games", "").unwrap();

        assert!(store.add_domain_to_list(list, "roblox.com").unwrap());
        assert!(!store.add_domain_to_list(list, "roblox.com").unwrap());
        store.add_domain_to_list(list, "*.fortnite.com").unwrap();

        store.set_list_enabled(list, false).unwrap();
        assert!(store.enabled_domains().unwrap().is_empty());
        assert!(!store.list(list).unwrap().unwrap().enabled);

        store.set_list_enabled(list, true).unwrap();
        assert_eq!(store.enabled_domains().unwrap().len(), 2);
    }

    #[test]
    fn add_domain_to_list_moves_existing_domain() {
        let store = store();
        let first = store.create_list("first", "").unwrap();
        let second = store.create_list("second", "").unwrap();
        store.add_domain_to_list(first, "example.com").unwrap();

        assert!(store.add_domain_to_list(second, "example.com").unwrap());

        let site = store.site_by_domain("example.com").unwrap().unwrap();
        assert_eq!(site.custom_list_id, Some(second));
    }

    #[test]
    fn delete_list_removes_members() {
        let store = store();
        let list = store.create_list("school", "weekday distractions").unwrap();
        store.add_domain_to_list(list, "youtube.com").unwrap();
        store.add_custom_site("other.com").unwrap();

        store.delete_list(list).unwrap();

        assert!(store.list(list).unwrap().is_none());
        assert_eq!(store.enabled_domains().unwrap(), vec!["other.com"]);
    }

    #[test]
    fn rules_round_trip_through_storage() {
        let store = store();
        let quota = TimeRule::quota(
            RuleTarget::Domain("YouTube.com".into()),
            RuleAction::Allow,
            30,
            "1,2,3,4,5".parse().unwrap(),
        );
        let schedule = TimeRule::schedule(
            RuleTarget::Category(Category::SocialMedia),
            RuleAction::Block,
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            Days::EVERY_DAY,
        );
        let quota_id = store.add_rule(&quota).unwrap();
        let schedule_id = store.add_rule(&schedule).unwrap();

        let rules = store.enabled_rules().unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, quota_id);
        assert_eq!(rules[0].target, RuleTarget::Domain("youtube.com".into()));
        assert_eq!(rules[0].kind, RuleKind::Quota { daily_limit_minutes: 30 });
        assert_eq!(rules[0].days, quota.days);
        assert_eq!(rules[1].id, schedule_id);
        assert_eq!(rules[1].kind, schedule.kind);
        assert_eq!(rules[1].target, schedule.target);
    }

    #[test]
    fn enabled_rules_skips_disabled_and_malformed_rows() {
        let store = store();
        let id = store
            .add_rule(&TimeRule::quota(RuleTarget::All, RuleAction::Allow, 10, Days::EVERY_DAY))
            .unwrap();
        store.set_rule_enabled(id, false).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO time_rules (action, daily_limit_minutes, start_hour, end_hour)
                 VALUES ('ALLOW', 10, 1, 2)",
                [],
            )
            .unwrap();

        assert!(store.enabled_rules().unwrap().is_empty());
    }

    #[test]
    fn usage_update_and_reset() {
        let store = store();
        let id = store
            .add_rule(&TimeRule::quota(RuleTarget::All, RuleAction::Allow, 10, Days::EVERY_DAY))
            .unwrap();

        store.update_usage_and_timestamp(id, 7, 1_000).unwrap();
        let usage = store.usage(id).unwrap().unwrap();
        assert_eq!(usage.used_minutes_today, 7);
        assert_eq!(usage.last_query_ms, Some(1_000));

        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        store.reset_daily_usage(today).unwrap();
        let usage = store.usage(id).unwrap().unwrap();
        assert_eq!(usage, Usage {
            used_minutes_today: 0,
            last_reset_date: Some(today),
            last_query_ms: None,
        });

        assert!(store.usage(id + 100).unwrap().is_none());
    }

    #[test]
    fn data_version_moves_on_foreign_commits_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.db");
        let store = SqliteStore::open(&path).unwrap();
        let other = SqliteStore::open(&path).unwrap();

        let start = store.data_version().unwrap();
        store.add_custom_site("own.com").unwrap();
        assert_eq!(store.data_version().unwrap(), start);

        other.add_custom_site("foreign.com").unwrap();
        assert_ne!(store.data_version().unwrap(), start);
    }

    #[test]
    fn open_creates_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_custom_site("persisted.com").unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.enabled_domains().unwrap(), vec!["persisted.com"]);
    }
}

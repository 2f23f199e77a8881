//! Time rule evaluation.
//!
//! Matching and the block decision are pure; the only side effect is the
//! quota usage commit, which runs under a per-rule lock and re-reads the
//! stored usage so concurrent queries for the same rule never lose an
//! update.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::model::{RuleAction, RuleKind, RuleTarget, TimeRule, Usage};
use crate::filter::{normalize_domain, suffixes};
use crate::store::{BlocklistStore, RuleStore, StoreError};

/// Queries further apart than this start a new usage session.
pub const SESSION_TIMEOUT_MS: i64 = 5 * 60 * 1000;

const MINUTE_MS: i64 = 60 * 1000;

/// Fold one query at `now_ms` into a rule's usage.
///
/// A query within [`SESSION_TIMEOUT_MS`] of the previous one continues the
/// session and adds the whole minutes elapsed since it. Anything else,
/// including a clock that went backwards, starts a new session and adds
/// nothing.
pub fn accrue(usage: Usage, now_ms: i64) -> Usage {
    let added = match usage.last_query_ms {
        Some(last) => {
            let gap = now_ms - last;
            if (0..=SESSION_TIMEOUT_MS).contains(&gap) {
                (gap / MINUTE_MS) as u32
            } else {
                0
            }
        }
        None => 0,
    };

    Usage {
        used_minutes_today: usage.used_minutes_today.saturating_add(added),
        last_query_ms: Some(now_ms),
        ..usage
    }
}

/// Whether `now` falls inside the window `[start, end)`.
///
/// A window with `end < start` wraps midnight and is inside when
/// `now >= start` or `now <= end`. `start == end` is an empty window.
pub fn in_window(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start <= end {
        start <= now && now < end
    } else {
        now >= start || now <= end
    }
}

fn schedule_blocks(action: RuleAction, inside: bool) -> bool {
    match action {
        RuleAction::Block => inside,
        RuleAction::Allow => !inside,
    }
}

fn quota_blocks(action: RuleAction, usage: &Usage, daily_limit_minutes: u32) -> bool {
    action == RuleAction::Allow && usage.used_minutes_today >= daily_limit_minutes
}

/// Evaluates enabled time rules against queried domains.
pub struct TimeRuleEngine {
    rules: Arc<dyn RuleStore>,
    sites: Arc<dyn BlocklistStore>,
    usage_locks: Mutex<FxHashMap<i64, Arc<Mutex<()>>>>,
}

impl TimeRuleEngine {
    pub fn new(rules: Arc<dyn RuleStore>, sites: Arc<dyn BlocklistStore>) -> Self {
        Self {
            rules,
            sites,
            usage_locks: Mutex::new(FxHashMap::default()),
        }
    }

    /// Evaluate `domain` at the current local time.
    pub fn evaluate(&self, domain: &str) -> Result<bool, StoreError> {
        self.evaluate_at(domain, &Local::now())
    }

    /// Evaluate `domain` at `now`; `true` means block.
    ///
    /// Every matching rule for today's weekday is evaluated so that each
    /// matching quota rule records usage, even once another rule has
    /// already decided to block.
    pub fn evaluate_at<Tz: TimeZone>(
        &self,
        domain: &str,
        now: &DateTime<Tz>,
    ) -> Result<bool, StoreError> {
        let domain = normalize_domain(domain);
        let weekday = now.weekday();
        let time = now.time();
        let now_ms = now.timestamp_millis();

        let mut block = false;
        for rule in self.rules.enabled_rules()? {
            if !rule.days.contains(weekday) || !self.matches(&rule, &domain)? {
                continue;
            }

            let rule_blocks = match rule.kind {
                RuleKind::Schedule { start, end } => {
                    schedule_blocks(rule.action, in_window(start, end, time))
                }
                RuleKind::Quota { daily_limit_minutes } => {
                    let usage = self.record_usage(&rule, now_ms)?;
                    quota_blocks(rule.action, &usage, daily_limit_minutes)
                }
            };

            if rule_blocks {
                debug!("Time rule {} blocks {}", rule.id, domain);
                block = true;
            }
        }

        Ok(block)
    }

    /// Zero every rule's daily usage.
    pub fn reset_daily_usage(&self, today: NaiveDate) -> Result<(), StoreError> {
        self.rules.reset_daily_usage(today)
    }

    fn matches(&self, rule: &TimeRule, domain: &str) -> Result<bool, StoreError> {
        match &rule.target {
            RuleTarget::All => Ok(true),
            RuleTarget::Domain(target) => Ok(suffixes(domain).any(|s| s == target)),
            RuleTarget::Category(category) => {
                self.any_recorded(domain, |site| site.category == *category)
            }
            RuleTarget::List(list_id) => {
                self.any_recorded(domain, |site| site.custom_list_id == Some(*list_id))
            }
        }
    }

    /// Whether the domain or one of its parents is stored and satisfies `pred`.
    fn any_recorded<F>(&self, domain: &str, pred: F) -> Result<bool, StoreError>
    where
        F: Fn(&super::BlockedSite) -> bool,
    {
        for suffix in suffixes(domain) {
            if let Some(site) = self.sites.site_by_domain(suffix)? {
                if pred(&site) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn record_usage(&self, rule: &TimeRule, now_ms: i64) -> Result<Usage, StoreError> {
        let lock = self.usage_lock(rule.id)?;
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;

        let current = self.rules.usage(rule.id)?.unwrap_or(rule.usage);
        let next = accrue(current, now_ms);
        self.rules
            .update_usage_and_timestamp(rule.id, next.used_minutes_today, now_ms)?;
        Ok(next)
    }

    fn usage_lock(&self, rule_id: i64) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.usage_locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks.entry(rule_id).or_default().clone())
    }
}

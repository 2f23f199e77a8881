//! Time rule and blocklist record types.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};

/// Category a blocklist entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Adult,
    Malware,
    Gambling,
    SocialMedia,
    Custom,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Adult,
        Category::Malware,
        Category::Gambling,
        Category::SocialMedia,
        Category::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Adult => "ADULT",
            Category::Malware => "MALWARE",
            Category::Gambling => "GAMBLING",
            Category::SocialMedia => "SOCIAL_MEDIA",
            Category::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// A stored blocklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedSite {
    pub id: i64,
    /// Normalized domain, possibly with a literal `*.` prefix.
    pub domain: String,
    pub category: Category,
    pub enabled: bool,
    pub custom: bool,
    pub custom_list_id: Option<i64>,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

/// A user-defined group of domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomList {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// What a rule does with the domains it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Access permitted only inside the window / under the quota.
    Allow,
    /// Access denied inside the window.
    Block,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Allow => "ALLOW",
            RuleAction::Block => "BLOCK",
        }
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(RuleAction::Allow),
            "BLOCK" => Ok(RuleAction::Block),
            _ => Err(format!("unknown rule action '{}'", s)),
        }
    }
}

/// Which domains a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    All,
    Domain(String),
    Category(Category),
    List(i64),
}

/// The shape of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Time-of-day window; `end < start` wraps past midnight.
    Schedule { start: NaiveTime, end: NaiveTime },
    /// Daily usage budget in minutes.
    Quota { daily_limit_minutes: u32 },
}

/// Set of ISO weekdays (Monday = 1 .. Sunday = 7).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Days(u8);

impl Days {
    pub const EVERY_DAY: Days = Days(0b111_1111);

    pub fn empty() -> Self {
        Days(0)
    }

    /// Build from ISO weekday numbers, rejecting anything outside 1..=7.
    pub fn from_iso(days: impl IntoIterator<Item = u32>) -> Option<Self> {
        let mut bits = 0u8;
        for day in days {
            if !(1..=7).contains(&day) {
                return None;
            }
            bits |= 1 << (day - 1);
        }
        Some(Days(bits))
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << (day.number_from_monday() - 1)) != 0
    }

    pub fn iter(self) -> impl Iterator<Item = u32> {
        (1..=7).filter(move |d| self.0 & (1 << (d - 1)) != 0)
    }
}

impl fmt::Debug for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Stored as a comma separated list, e.g. `1,2,3,4,5`.
impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        f.write_str(&days.join(","))
    }
}

impl FromStr for Days {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let days = s
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| d.parse::<u32>().map_err(|_| format!("bad weekday '{}'", d)))
            .collect::<Result<Vec<_>, _>>()?;
        Days::from_iso(days).ok_or_else(|| format!("weekday out of range in '{}'", s))
    }
}

/// Mutable per-rule usage accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub used_minutes_today: u32,
    pub last_reset_date: Option<NaiveDate>,
    /// Epoch milliseconds of the last query that matched this rule.
    pub last_query_ms: Option<i64>,
}

/// A time-based access rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRule {
    pub id: i64,
    pub target: RuleTarget,
    pub action: RuleAction,
    pub kind: RuleKind,
    pub days: Days,
    pub enabled: bool,
    pub usage: Usage,
}

impl TimeRule {
    /// A daily-limit rule. The id is assigned by the store.
    pub fn quota(target: RuleTarget, action: RuleAction, limit_minutes: u32, days: Days) -> Self {
        Self::new(
            target,
            action,
            RuleKind::Quota {
                daily_limit_minutes: limit_minutes,
            },
            days,
        )
    }

    /// A time-of-day window rule. The id is assigned by the store.
    pub fn schedule(
        target: RuleTarget,
        action: RuleAction,
        start: NaiveTime,
        end: NaiveTime,
        days: Days,
    ) -> Self {
        Self::new(target, action, RuleKind::Schedule { start, end }, days)
    }

    fn new(target: RuleTarget, action: RuleAction, kind: RuleKind, days: Days) -> Self {
        Self {
            id: 0,
            target,
            action,
            kind,
            days,
            enabled: true,
            usage: Usage::default(),
        }
    }
}

//! Time-based access rules.

mod engine;
mod model;

pub use engine::{SESSION_TIMEOUT_MS, TimeRuleEngine, accrue, in_window};
pub use model::{
    BlockedSite, Category, CustomList, Days, RuleAction, RuleKind, RuleTarget, TimeRule, Usage,
};

//! Background upkeep: the daily usage reset at local midnight and
//! picking up blocklist edits made by other processes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use tracing::{debug, error, info};

use crate::resolver::Resolver;
use crate::store::RuleStore;

/// Time left until the next midnight in `now`'s timezone.
///
/// Falls back to a full day when the next midnight does not exist locally
/// (a DST jump over 00:00).
pub fn until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .map(|date| date.and_time(NaiveTime::MIN));

    tomorrow
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest())
        .and_then(|next| (next - now.clone()).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

/// Reset every rule's usage each local midnight, forever.
pub async fn run_daily_reset(store: Arc<dyn RuleStore>) {
    loop {
        let wait = until_next_midnight(&Local::now());
        info!("Next daily usage reset in {}s", wait.as_secs());
        tokio::time::sleep(wait).await;

        let today = Local::now().date_naive();
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.reset_daily_usage(today)).await {
            Ok(Ok(())) => info!("Daily usage reset for {}", today),
            Ok(Err(e)) => error!("Daily usage reset failed: {}", e),
            Err(e) => error!("Daily usage reset task failed: {}", e),
        }
    }
}

/// Poll the store every `period` and swap in a fresh snapshot whenever
/// another connection has committed to it.
pub async fn watch_store_changes(resolver: Arc<Resolver>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;

        let resolver = resolver.clone();
        match tokio::task::spawn_blocking(move || resolver.refresh_if_changed()).await {
            Ok(Ok(Some(_))) => debug!("Picked up store changes"),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => error!("Blocklist refresh failed, keeping previous snapshot: {}", e),
            Err(e) => error!("Blocklist refresh task failed: {}", e),
        }
    }
}

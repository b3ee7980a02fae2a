//! Fixed-tick schedule runner.
//!
//! Every minute the runner reads the schedule list and fires any enabled
//! entry whose `HH:MM` matches the current UTC minute through the shared
//! arbiter, the exact same path a manual request takes, so every safety
//! rule applies. Denials are expected outcomes and are logged at info
//! level; only storage faults are errors. Nothing here retries: a denied
//! or failed scheduled feed waits for its next firing time.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::services::SharedFeeder;
use crate::state::{FeedOutcome, FeedSource};
use crate::traits::FeederRelay;

/// How often the schedule list is evaluated.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the schedule evaluation loop.
///
/// The task runs for the life of the process. A last-evaluated-minute
/// guard ensures each entry fires at most once per matching minute even if
/// tick timing drifts.
pub fn spawn_schedule_runner<R: FeederRelay + Send + 'static>(
    shared: Arc<SharedFeeder<R>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_minute: Option<String> = None;

        loop {
            tick.tick().await;
            let minute = Utc::now().format("%H:%M").to_string();
            if last_minute.as_deref() == Some(minute.as_str()) {
                continue;
            }
            last_minute = Some(minute.clone());

            let schedules = match shared.with_schedules(|store| store.load()) {
                Ok(schedules) => schedules,
                Err(err) => {
                    error!("schedule evaluation skipped: {err}");
                    continue;
                }
            };

            for entry in schedules.iter().filter(|e| e.enabled && e.time == minute) {
                let source = FeedSource::Schedule(entry.id.clone());
                match shared.attempt_feed(source, entry.duration_ms).await {
                    Ok(FeedOutcome::Allowed(receipt)) => {
                        info!(
                            "scheduled feed {} ran for {}ms ({} today)",
                            entry.id, receipt.duration_ms, receipt.feeds_today
                        );
                    }
                    Ok(FeedOutcome::Denied(denial)) => {
                        info!("scheduled feed {} denied: {}", entry.id, denial.message);
                    }
                    Err(err) => {
                        error!("scheduled feed {} hit a store failure: {err}", entry.id);
                    }
                }
            }
        }
    })
}

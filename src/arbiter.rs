//! Feed arbitration engine.
//!
//! This module provides [`FeedArbiter`], the single decision point every
//! feed request flows through. Manual and scheduled triggers call the same
//! [`attempt_feed`] so all safety rules apply uniformly.
//!
//! # Overview
//!
//! One pass through the engine:
//!
//! 1. Load the persisted record; roll the daily counter on a new UTC day
//!    and drop an expired suspension (both written through before any rule
//!    runs).
//! 2. Evaluate the blocking rules in a fixed order; the first failing rule
//!    produces the denial, so callers can report the single most relevant
//!    cause.
//! 3. Pre-commit `is_feeding` + `last_attempt_at` durably, then pulse the
//!    relay. The pre-commit is what makes the `ALREADY_FEEDING` rule
//!    effective against a second request arriving mid-pulse, and it is the
//!    record a crash mid-actuation leaves behind (see
//!    [`recover_stale_feeding`]).
//! 4. On success advance the counters; on relay failure record the error
//!    and advance **nothing**: a failed pulse must not consume a daily
//!    slot or reset the interval clock.
//!
//! The engine is not thread-safe by itself. The services layer wraps it in
//! a single async mutex so the read-check-write sequence is atomic with
//! respect to other callers; see `services::SharedFeeder`.
//!
//! [`attempt_feed`]: FeedArbiter::attempt_feed
//! [`recover_stale_feeding`]: FeedArbiter::recover_stale_feeding
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use pifeeder::hal::MockRelay;
//! use pifeeder::{FeedArbiter, FeedSource, StateStore};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = StateStore::new("storage/state.json");
//! let mut arbiter = FeedArbiter::new(store, MockRelay::new());
//!
//! let outcome = arbiter
//!     .attempt_feed(FeedSource::Manual, 2000, Utc::now())
//!     .await
//!     .unwrap();
//! println!("fed: {}", outcome.is_allowed());
//! # });
//! ```

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::time::Duration;

use crate::state::{DenyReason, FeedDenial, FeedOutcome, FeedReceipt, FeedSource, FeederState};
use crate::store::{StateStore, StoreError};
use crate::traits::FeederRelay;

/// Round milliseconds up to whole minutes for user-facing wait messages.
fn minutes_ceil(ms: i64) -> i64 {
    (ms + 59_999) / 60_000
}

/// Evaluate the blocking rules against a state snapshot.
///
/// Pure function: no clock, no storage, no hardware. Returns the denial
/// produced by the **first** failing rule, or `None` when the feed may
/// proceed. The order is part of the contract:
///
/// 1. master switch off
/// 2. temporary suspension active
/// 3. actuation already in flight
/// 4. manual cooldown (manual requests only)
/// 5. global minimum interval (every source)
/// 6. daily limit
/// 7. duration bounds
pub fn evaluate_rules(
    state: &FeederState,
    source: &FeedSource,
    duration_ms: u64,
    now: DateTime<Utc>,
) -> Option<FeedDenial> {
    if !state.enabled {
        return Some(FeedDenial::new(
            DenyReason::FeedingDisabled,
            "Feeding is currently disabled in system settings",
        ));
    }

    if let Some(until) = state.disabled_until {
        if until > now {
            let remaining_ms = (until - now).num_milliseconds();
            return Some(FeedDenial {
                minutes_remaining: Some(minutes_ceil(remaining_ms)),
                disabled_until: Some(until),
                ..FeedDenial::new(
                    DenyReason::TemporarilyDisabled,
                    format!("Feeding is temporarily disabled until {}", until.to_rfc3339()),
                )
            });
        }
    }

    if state.is_feeding {
        return Some(FeedDenial::new(
            DenyReason::AlreadyFeeding,
            "A feeding operation is already in progress",
        ));
    }

    if source.is_manual() {
        if let Some(last_manual) = state.last_manual_feed_at {
            let since_ms = (now - last_manual).num_milliseconds();
            if since_ms < state.manual_cooldown_ms as i64 {
                let wait = minutes_ceil(state.manual_cooldown_ms as i64 - since_ms);
                return Some(FeedDenial {
                    minutes_remaining: Some(wait),
                    ..FeedDenial::new(
                        DenyReason::ManualCooldown,
                        format!("Manual feed cooldown active. Please wait {wait} more minutes."),
                    )
                });
            }
        }
    }

    if let Some(last_feed) = state.last_feed_at {
        let since_ms = (now - last_feed).num_milliseconds();
        if since_ms < state.min_interval_ms as i64 {
            let wait = minutes_ceil(state.min_interval_ms as i64 - since_ms);
            return Some(FeedDenial {
                minutes_until_next_feed: Some(wait),
                last_feed_time: Some(last_feed),
                ..FeedDenial::new(
                    DenyReason::MinIntervalNotReached,
                    format!(
                        "Minimum interval not reached. Last feed was {} minutes ago. \
                         Please wait {wait} more minutes.",
                        since_ms / 60_000
                    ),
                )
            });
        }
    }

    if state.feeds_today >= state.max_daily_feeds {
        return Some(FeedDenial {
            feeds_today: Some(state.feeds_today),
            ..FeedDenial::new(
                DenyReason::DailyLimitReached,
                format!(
                    "Daily feeding limit reached ({} feedings per day). \
                     Already fed {} times today.",
                    state.max_daily_feeds, state.feeds_today
                ),
            )
        });
    }

    if duration_ms == 0 || duration_ms > state.max_duration_ms {
        return Some(FeedDenial {
            requested_duration_ms: Some(duration_ms),
            max_duration_ms: Some(state.max_duration_ms),
            ..FeedDenial::new(
                DenyReason::InvalidDuration,
                format!(
                    "Invalid feed duration. Requested {duration_ms}ms but max is {}ms.",
                    state.max_duration_ms
                ),
            )
        });
    }

    None
}

/// The feed arbitration engine.
///
/// Owns the state store and the relay; everything else (HTTP, scheduler)
/// talks to it through [`attempt_feed`](Self::attempt_feed).
///
/// # Type Parameter
///
/// - `R`: the actuation backend ([`FeederRelay`] trait): a GPIO pin on the
///   Pi, [`MockRelay`](crate::hal::MockRelay) in tests.
pub struct FeedArbiter<R: FeederRelay> {
    store: StateStore,
    relay: R,
}

impl<R: FeederRelay> FeedArbiter<R> {
    /// Create an arbiter over a state store and a relay.
    pub fn new(store: StateStore, relay: R) -> Self {
        Self { store, relay }
    }

    /// The underlying state store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The actuation backend (mainly for test inspection).
    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Current state snapshot (fresh read from the store).
    pub fn state(&self) -> Result<FeederState, StoreError> {
        self.store.load()
    }

    /// Clear an `is_feeding` flag left behind by a crash mid-actuation.
    ///
    /// Call once at process start. The flag is considered stale when
    /// `last_attempt_at` is missing or older than twice the maximum pulse
    /// duration; a live actuation can never be older than that, so this
    /// cannot race a real feed. Returns whether a recovery happened.
    pub fn recover_stale_feeding(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.store.load()?;
        if !state.is_feeding {
            return Ok(false);
        }

        let stale_after = chrono::Duration::milliseconds(2 * state.max_duration_ms as i64);
        let stale = match state.last_attempt_at {
            None => true,
            Some(attempted) => now - attempted > stale_after,
        };
        if !stale {
            return Ok(false);
        }

        state.is_feeding = false;
        self.store.save(&state)?;
        warn!(
            "cleared stale in-flight feed flag (last attempt: {})",
            state
                .last_attempt_at
                .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
        );
        Ok(true)
    }

    /// Arbitrate one feed request and, if permitted, run the actuation.
    ///
    /// `now` is passed in rather than read from the wall clock so the
    /// decision sequence is deterministic under test. The call may take up
    /// to `duration_ms` to return while the relay is energized.
    ///
    /// Only storage faults come back as `Err`; every policy or hardware
    /// denial is an ordinary [`FeedOutcome::Denied`].
    pub async fn attempt_feed(
        &mut self,
        source: FeedSource,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<FeedOutcome, StoreError> {
        let mut state = self.store.load()?;

        if state.roll_daily_counter(now.date_naive()) {
            self.store.save(&state)?;
        }
        if state.clear_expired_suspension(now) {
            self.store.save(&state)?;
        }

        if let Some(denial) = evaluate_rules(&state, &source, duration_ms, now) {
            return Ok(FeedOutcome::Denied(denial));
        }

        // Durable pre-commit: survives a crash mid-actuation and is what a
        // concurrent request observes as ALREADY_FEEDING.
        state.is_feeding = true;
        state.last_attempt_at = Some(now);
        self.store.save(&state)?;

        info!("feeding ({source}) for {duration_ms}ms");
        let pulsed = self.relay.pulse(Duration::from_millis(duration_ms)).await;

        match pulsed {
            Ok(()) => {
                state.is_feeding = false;
                state.last_feed_at = Some(now);
                state.feeds_today += 1;
                state.feed_count += 1;
                if source.is_manual() {
                    state.last_manual_feed_at = Some(now);
                }
                state.last_source = Some(source.clone());
                state.last_error = None;
                self.store.save(&state)?;
                info!("feed complete ({} today)", state.feeds_today);

                Ok(FeedOutcome::Allowed(FeedReceipt {
                    source,
                    duration_ms,
                    fed_at: now,
                    feeds_today: state.feeds_today,
                }))
            }
            Err(err) => {
                let message = err.to_string();
                state.is_feeding = false;
                state.last_error = Some(message.clone());
                self.store.save(&state)?;
                error!("feed actuation failed: {message}");

                Ok(FeedOutcome::Denied(FeedDenial::new(
                    DenyReason::ActuationFailed,
                    format!("Feeder actuation failed: {message}"),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 8, 12, 0, 0).unwrap()
    }

    fn open_state(now: DateTime<Utc>) -> FeederState {
        // A state with no history: every rule passes for any source.
        FeederState {
            last_reset_date: Some(now.date_naive()),
            ..FeederState::default()
        }
    }

    #[test]
    fn rules_pass_on_open_state() {
        let now = fixed_now();
        let state = open_state(now);
        assert_eq!(evaluate_rules(&state, &FeedSource::Manual, 2000, now), None);
    }

    #[test]
    fn disabled_wins_over_everything() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.enabled = false;
        state.is_feeding = true;
        state.feeds_today = 99;

        let denial = evaluate_rules(&state, &FeedSource::Manual, 0, now).unwrap();
        assert_eq!(denial.reason, DenyReason::FeedingDisabled);
    }

    #[test]
    fn suspension_reports_remaining_minutes() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.disabled_until = Some(now + chrono::Duration::minutes(90));

        let denial = evaluate_rules(&state, &FeedSource::Manual, 2000, now).unwrap();
        assert_eq!(denial.reason, DenyReason::TemporarilyDisabled);
        assert_eq!(denial.minutes_remaining, Some(90));
    }

    #[test]
    fn in_flight_feed_blocks_before_cooldowns() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.is_feeding = true;
        state.last_feed_at = Some(now - chrono::Duration::minutes(1));

        let denial = evaluate_rules(&state, &FeedSource::Manual, 2000, now).unwrap();
        assert_eq!(denial.reason, DenyReason::AlreadyFeeding);
    }

    #[test]
    fn manual_cooldown_only_hits_manual_sources() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.last_manual_feed_at = Some(now - chrono::Duration::minutes(2));
        // Keep the global interval out of the way.
        state.min_interval_ms = 0;

        let denial = evaluate_rules(&state, &FeedSource::Manual, 2000, now).unwrap();
        assert_eq!(denial.reason, DenyReason::ManualCooldown);
        assert_eq!(denial.minutes_remaining, Some(3));

        let scheduled = FeedSource::Schedule("s1".into());
        assert_eq!(evaluate_rules(&state, &scheduled, 2000, now), None);
    }

    #[test]
    fn min_interval_reports_minutes_until_next_feed() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.last_feed_at = Some(now - chrono::Duration::minutes(30));

        let denial = evaluate_rules(&state, &FeedSource::Manual, 2000, now).unwrap();
        assert_eq!(denial.reason, DenyReason::MinIntervalNotReached);
        assert_eq!(denial.minutes_until_next_feed, Some(30));
        assert_eq!(denial.last_feed_time, state.last_feed_at);
    }

    #[test]
    fn min_interval_applies_to_scheduled_sources() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.last_feed_at = Some(now - chrono::Duration::minutes(30));

        let denial =
            evaluate_rules(&state, &FeedSource::Schedule("s1".into()), 2000, now).unwrap();
        assert_eq!(denial.reason, DenyReason::MinIntervalNotReached);
    }

    #[test]
    fn daily_limit_reached() {
        let now = fixed_now();
        let mut state = open_state(now);
        state.feeds_today = 5;

        let denial = evaluate_rules(&state, &FeedSource::Manual, 2000, now).unwrap();
        assert_eq!(denial.reason, DenyReason::DailyLimitReached);
        assert_eq!(denial.feeds_today, Some(5));
    }

    #[test]
    fn duration_bounds() {
        let now = fixed_now();
        let state = open_state(now);

        let denial = evaluate_rules(&state, &FeedSource::Manual, 5001, now).unwrap();
        assert_eq!(denial.reason, DenyReason::InvalidDuration);
        assert_eq!(denial.requested_duration_ms, Some(5001));
        assert_eq!(denial.max_duration_ms, Some(5000));

        let denial = evaluate_rules(&state, &FeedSource::Manual, 0, now).unwrap();
        assert_eq!(denial.reason, DenyReason::InvalidDuration);

        assert_eq!(evaluate_rules(&state, &FeedSource::Manual, 5000, now), None);
    }

    #[test]
    fn minutes_round_up() {
        assert_eq!(minutes_ceil(1), 1);
        assert_eq!(minutes_ceil(60_000), 1);
        assert_eq!(minutes_ceil(60_001), 2);
        assert_eq!(minutes_ceil(1_800_000), 30);
    }
}

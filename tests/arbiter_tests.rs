//! Integration tests for the feed arbitration engine.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use pifeeder::hal::MockRelay;
use pifeeder::{
    DenyReason, FeedArbiter, FeedOutcome, FeedSource, FeederState, StateStore,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 8, 12, 0, 0).unwrap()
}

/// Arbiter over a fresh tempdir-backed store, seeded with `state`.
fn arbiter_with(state: FeederState) -> (FeedArbiter<MockRelay>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    store.save(&state).unwrap();
    (FeedArbiter::new(store, MockRelay::new()), dir)
}

/// A state where every rule passes for any source at `now()`.
fn open_state() -> FeederState {
    FeederState {
        last_reset_date: Some(now().date_naive()),
        ..FeederState::default()
    }
}

#[tokio::test]
async fn allowed_feed_advances_counters() {
    let (mut arbiter, _dir) = arbiter_with(open_state());

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    let receipt = match outcome {
        FeedOutcome::Allowed(receipt) => receipt,
        FeedOutcome::Denied(denial) => panic!("unexpected denial: {denial:?}"),
    };
    assert_eq!(receipt.duration_ms, 2000);
    assert_eq!(receipt.feeds_today, 1);

    let state = arbiter.state().unwrap();
    assert_eq!(state.feeds_today, 1);
    assert_eq!(state.feed_count, 1);
    assert_eq!(state.last_feed_at, Some(now()));
    assert_eq!(state.last_manual_feed_at, Some(now()));
    assert_eq!(state.last_source, Some(FeedSource::Manual));
    assert!(!state.is_feeding);
    assert_eq!(arbiter.relay().pulses, vec![2000]);
}

#[tokio::test]
async fn scheduled_feed_does_not_touch_manual_timestamp() {
    let (mut arbiter, _dir) = arbiter_with(open_state());

    let outcome = arbiter
        .attempt_feed(FeedSource::Schedule("morning".into()), 3000, now())
        .await
        .unwrap();

    assert!(outcome.is_allowed());
    let state = arbiter.state().unwrap();
    assert_eq!(state.last_manual_feed_at, None);
    assert_eq!(
        state.last_source,
        Some(FeedSource::Schedule("morning".into()))
    );
}

#[tokio::test]
async fn over_duration_denied_and_state_unchanged() {
    let (mut arbiter, _dir) = arbiter_with(open_state());
    let before = arbiter.state().unwrap();

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 6000, now())
        .await
        .unwrap();

    let denial = outcome.denial().expect("expected a denial").clone();
    assert_eq!(denial.reason, DenyReason::InvalidDuration);
    assert_eq!(denial.requested_duration_ms, Some(6000));
    assert_eq!(denial.max_duration_ms, Some(5000));

    assert_eq!(arbiter.state().unwrap(), before);
    assert_eq!(arbiter.relay().pulse_count(), 0);
}

#[tokio::test]
async fn zero_duration_denied() {
    let (mut arbiter, _dir) = arbiter_with(open_state());

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 0, now())
        .await
        .unwrap();

    assert_eq!(
        outcome.denial().unwrap().reason,
        DenyReason::InvalidDuration
    );
    assert_eq!(arbiter.relay().pulse_count(), 0);
}

#[tokio::test]
async fn daily_limit_caps_feeds() {
    // Interval and cooldown out of the way; only the daily budget limits.
    let mut state = open_state();
    state.min_interval_ms = 0;
    state.manual_cooldown_ms = 0;
    let (mut arbiter, _dir) = arbiter_with(state);

    for i in 1..=5 {
        let outcome = arbiter
            .attempt_feed(FeedSource::Manual, 1000, now())
            .await
            .unwrap();
        assert!(outcome.is_allowed(), "feed {i} should be allowed");
    }

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 1000, now())
        .await
        .unwrap();
    let denial = outcome.denial().unwrap();
    assert_eq!(denial.reason, DenyReason::DailyLimitReached);
    assert_eq!(denial.feeds_today, Some(5));
    assert_eq!(arbiter.state().unwrap().feeds_today, 5);
}

#[tokio::test]
async fn disabled_denial_is_idempotent() {
    let mut state = open_state();
    state.enabled = false;
    let (mut arbiter, _dir) = arbiter_with(state);
    let before = arbiter.state().unwrap();

    let first = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();
    let second = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    assert_eq!(first.denial().unwrap().reason, DenyReason::FeedingDisabled);
    assert_eq!(first, second);
    assert_eq!(arbiter.state().unwrap(), before);
    assert_eq!(arbiter.relay().pulse_count(), 0);
}

#[tokio::test]
async fn in_flight_feed_rejected_without_actuation() {
    // Simulates the second of two concurrent requests: the first has
    // durably pre-committed is_feeding before its pulse completes.
    let mut state = open_state();
    state.is_feeding = true;
    state.last_attempt_at = Some(now());
    let (mut arbiter, _dir) = arbiter_with(state);

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    assert_eq!(outcome.denial().unwrap().reason, DenyReason::AlreadyFeeding);
    assert_eq!(arbiter.relay().pulse_count(), 0);
}

#[tokio::test]
async fn manual_cooldown_blocks_manual_but_not_scheduled() {
    let mut state = open_state();
    state.min_interval_ms = 0;
    state.last_manual_feed_at = Some(now() - Duration::minutes(2));
    let (mut arbiter, _dir) = arbiter_with(state);

    let manual = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();
    let denial = manual.denial().unwrap();
    assert_eq!(denial.reason, DenyReason::ManualCooldown);
    assert_eq!(denial.minutes_remaining, Some(3));

    let scheduled = arbiter
        .attempt_feed(FeedSource::Schedule("s1".into()), 2000, now())
        .await
        .unwrap();
    assert!(scheduled.is_allowed());
}

#[tokio::test]
async fn min_interval_reports_thirty_minutes_remaining() {
    let mut state = open_state();
    state.last_feed_at = Some(now() - Duration::minutes(30));
    let (mut arbiter, _dir) = arbiter_with(state);

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    let denial = outcome.denial().unwrap();
    assert_eq!(denial.reason, DenyReason::MinIntervalNotReached);
    assert_eq!(denial.minutes_until_next_feed, Some(30));
    assert_eq!(arbiter.relay().pulse_count(), 0);
}

#[tokio::test]
async fn expired_suspension_cleared_and_feed_proceeds() {
    let mut state = open_state();
    state.disabled_until = Some(now() - Duration::minutes(5));
    let (mut arbiter, _dir) = arbiter_with(state);

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    // The stale suspension does not itself deny; it is cleared and the
    // remaining rules run (all of which pass here).
    assert!(outcome.is_allowed());
    assert_eq!(arbiter.state().unwrap().disabled_until, None);
}

#[tokio::test]
async fn active_suspension_denies_with_remaining_time() {
    let mut state = open_state();
    state.disabled_until = Some(now() + Duration::hours(1));
    let (mut arbiter, _dir) = arbiter_with(state);

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    let denial = outcome.denial().unwrap();
    assert_eq!(denial.reason, DenyReason::TemporarilyDisabled);
    assert_eq!(denial.minutes_remaining, Some(60));
    // Still set; it has not passed.
    assert!(arbiter.state().unwrap().disabled_until.is_some());
}

#[tokio::test]
async fn new_day_resets_counter_before_rules_run() {
    let mut state = open_state();
    state.feeds_today = 5;
    state.last_reset_date = Some((now() - Duration::days(1)).date_naive());
    let (mut arbiter, _dir) = arbiter_with(state);

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    // Yesterday's exhausted budget does not block today.
    assert!(outcome.is_allowed());
    let state = arbiter.state().unwrap();
    assert_eq!(state.feeds_today, 1);
    assert_eq!(state.last_reset_date, Some(now().date_naive()));
}

#[tokio::test]
async fn failed_actuation_consumes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    store.save(&open_state()).unwrap();
    let mut arbiter = FeedArbiter::new(store, MockRelay::failing("relay stuck"));

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    let denial = outcome.denial().unwrap();
    assert_eq!(denial.reason, DenyReason::ActuationFailed);
    assert!(denial.message.contains("relay stuck"));

    // A failed pulse consumes no daily slot and never starts the interval
    // clock; only the error is recorded.
    let state = arbiter.state().unwrap();
    assert!(!state.is_feeding);
    assert_eq!(state.feeds_today, 0);
    assert_eq!(state.feed_count, 0);
    assert_eq!(state.last_feed_at, None);
    assert_eq!(state.last_error.as_deref(), Some("relay stuck"));
}

#[tokio::test]
async fn success_after_failure_clears_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut seeded = open_state();
    seeded.last_error = Some("relay stuck".into());
    store.save(&seeded).unwrap();
    let mut arbiter = FeedArbiter::new(store, MockRelay::new());

    let outcome = arbiter
        .attempt_feed(FeedSource::Manual, 2000, now())
        .await
        .unwrap();

    assert!(outcome.is_allowed());
    assert_eq!(arbiter.state().unwrap().last_error, None);
}

#[tokio::test]
async fn stale_in_flight_flag_recovered_at_startup() {
    let mut state = open_state();
    state.is_feeding = true;
    // Far older than 2 x max_duration_ms (10s).
    state.last_attempt_at = Some(now() - Duration::hours(1));
    let (arbiter, _dir) = arbiter_with(state);

    assert!(arbiter.recover_stale_feeding(now()).unwrap());
    assert!(!arbiter.state().unwrap().is_feeding);

    // Second call is a no-op.
    assert!(!arbiter.recover_stale_feeding(now()).unwrap());
}

#[tokio::test]
async fn fresh_in_flight_flag_is_left_alone() {
    let mut state = open_state();
    state.is_feeding = true;
    state.last_attempt_at = Some(now() - Duration::seconds(3));
    let (arbiter, _dir) = arbiter_with(state);

    assert!(!arbiter.recover_stale_feeding(now()).unwrap());
    assert!(arbiter.state().unwrap().is_feeding);
}

#[tokio::test]
async fn missing_attempt_timestamp_counts_as_stale() {
    let mut state = open_state();
    state.is_feeding = true;
    state.last_attempt_at = None;
    let (arbiter, _dir) = arbiter_with(state);

    assert!(arbiter.recover_stale_feeding(now()).unwrap());
    assert!(!arbiter.state().unwrap().is_feeding);
}

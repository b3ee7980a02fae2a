//! Unified shared state for the HTTP handlers and the schedule runner.
//!
//! [`SharedFeeder`] wraps the one [`FeedArbiter`] behind a single async
//! mutex. That mutex **is** the serialization point the safety rules rely
//! on: the read-check-write sequence inside `attempt_feed` runs atomically
//! with respect to every other trigger source, and because the lock is held
//! across the (bounded) actuation await, a request arriving mid-pulse
//! either waits for the lock or, once it reads state, observes the
//! durable `is_feeding` pre-commit and is denied `ALREADY_FEEDING`.
//!
//! The sensor lives alongside but shares no mutable state with the
//! arbiter; its reads never contend with feeding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::arbiter::FeedArbiter;
use crate::sensor::UltrasonicSensor;
use crate::state::{FeedOutcome, FeedSource, FeederState};
use crate::store::{ScheduleStore, StoreError};
use crate::traits::FeederRelay;

/// Shared state for all services (HTTP handlers, schedule runner).
///
/// # Thread Safety
///
/// - The arbiter sits behind a `tokio::sync::Mutex`, not a `std` one,
///   because `attempt_feed` awaits the relay pulse while holding the lock
///   (up to `max_duration_ms`); a std mutex must not be held across an
///   await point.
/// - The schedule store does plain sync file I/O guarded by its own std
///   mutex so concurrent CRUD calls cannot interleave read-modify-write.
pub struct SharedFeeder<R: FeederRelay> {
    arbiter: Mutex<FeedArbiter<R>>,
    sensor: Arc<UltrasonicSensor>,
    schedules: std::sync::Mutex<ScheduleStore>,
    log_path: PathBuf,
}

impl<R: FeederRelay> SharedFeeder<R> {
    /// Bundle the arbiter with its sibling services.
    pub fn new(
        arbiter: FeedArbiter<R>,
        sensor: Arc<UltrasonicSensor>,
        schedules: ScheduleStore,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            arbiter: Mutex::new(arbiter),
            sensor,
            schedules: std::sync::Mutex::new(schedules),
            log_path: log_path.into(),
        }
    }

    /// Run one arbitrated feed attempt at the current wall-clock time.
    ///
    /// Serialized against every other caller; may take up to the requested
    /// duration while the relay is energized.
    pub async fn attempt_feed(
        &self,
        source: FeedSource,
        duration_ms: u64,
    ) -> Result<FeedOutcome, StoreError> {
        let mut arbiter = self.arbiter.lock().await;
        arbiter.attempt_feed(source, duration_ms, Utc::now()).await
    }

    /// Fresh snapshot of the persisted feeder state.
    pub async fn state(&self) -> Result<FeederState, StoreError> {
        self.arbiter.lock().await.state()
    }

    /// Read-modify-write the feeder state under the arbitration lock.
    ///
    /// Used by enable/disable; taking the arbiter lock keeps the mutation
    /// from interleaving with a decision sequence in flight.
    pub async fn update_state(
        &self,
        mutate: impl FnOnce(&mut FeederState),
    ) -> Result<FeederState, StoreError> {
        let arbiter = self.arbiter.lock().await;
        let mut state = arbiter.store().load()?;
        mutate(&mut state);
        arbiter.store().save(&state)?;
        Ok(state)
    }

    /// Access the arbiter directly (test hooks, recovery at startup).
    pub async fn with_arbiter<T>(&self, f: impl FnOnce(&mut FeedArbiter<R>) -> T) -> T {
        let mut arbiter = self.arbiter.lock().await;
        f(&mut arbiter)
    }

    /// The ultrasonic sensor monitor.
    pub fn sensor(&self) -> &UltrasonicSensor {
        &self.sensor
    }

    /// Run a closure against the schedule store under its lock.
    ///
    /// The closure pattern keeps the whole read-modify-write inside one
    /// critical section and the guard away from await points.
    pub fn with_schedules<T>(&self, f: impl FnOnce(&ScheduleStore) -> T) -> T {
        let store = self.schedules.lock().unwrap();
        f(&store)
    }

    /// Path of the append-only log file `GET /logs` tails.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockRelay;
    use crate::store::StateStore;

    fn shared_with_tempdir() -> (Arc<SharedFeeder<MockRelay>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let arbiter = FeedArbiter::new(
            StateStore::new(dir.path().join("state.json")),
            MockRelay::new(),
        );
        let shared = SharedFeeder::new(
            arbiter,
            Arc::new(UltrasonicSensor::simulate()),
            ScheduleStore::new(dir.path().join("schedules.json")),
            dir.path().join("feeder.log"),
        );
        (Arc::new(shared), dir)
    }

    #[tokio::test]
    async fn attempt_feed_serializes_and_records() {
        let (shared, _dir) = shared_with_tempdir();

        let outcome = shared.attempt_feed(FeedSource::Manual, 2000).await.unwrap();
        assert!(outcome.is_allowed());

        let state = shared.state().await.unwrap();
        assert_eq!(state.feeds_today, 1);
        assert!(!state.is_feeding);

        let pulses = shared.with_arbiter(|a| a.relay().pulses.clone()).await;
        assert_eq!(pulses, vec![2000]);
    }

    #[tokio::test]
    async fn update_state_writes_through() {
        let (shared, _dir) = shared_with_tempdir();

        let updated = shared.update_state(|s| s.enabled = false).await.unwrap();
        assert!(!updated.enabled);
        assert!(!shared.state().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn concurrent_manual_requests_one_wins() {
        // Two simultaneous manual requests: the mutex serializes them, and
        // whichever runs second is denied by the interval/cooldown rules
        // rather than double-feeding.
        let (shared, _dir) = shared_with_tempdir();

        let a = shared.attempt_feed(FeedSource::Manual, 2000);
        let b = shared.attempt_feed(FeedSource::Manual, 2000);
        let (ra, rb) = tokio::join!(a, b);

        let allowed = [ra.unwrap(), rb.unwrap()]
            .iter()
            .filter(|o| o.is_allowed())
            .count();
        assert_eq!(allowed, 1);
        assert_eq!(shared.state().await.unwrap().feeds_today, 1);
    }
}

//! # pifeeder
//!
//! A Raspberry Pi pet feeder daemon: safety-arbitrated relay actuation,
//! scheduled feedings, and ultrasonic food-level sensing over UART.
//!
//! ## Features
//!
//! - **Feed arbitration**: every feed request, manual or scheduled, runs
//!   through one engine enforcing the kill switch, temporary suspensions,
//!   in-flight exclusion, cooldowns, the daily budget, and duration bounds
//! - **Durable pre-commit**: `is_feeding` is persisted before the relay
//!   energizes, so a crash mid-pulse is visible and recoverable at startup
//! - **Resynchronizing sensor decoder**: raw UART chunks in, validated
//!   distance samples out, garbage tolerated
//! - **Hardware abstraction**: the relay is a trait; the whole engine runs
//!   and tests on a desktop against mocks
//!
//! ## Architecture
//!
//! - `state` - Persisted feeder record and arbitration result types
//! - `store` - Whole-record JSON persistence (state + schedules)
//! - `arbiter` - The feed arbitration engine
//! - `sensor` - Frame decoder and latest-sample monitor
//! - `schedule` - Schedule entries and boundary validation
//! - `traits` / `hal` - Relay abstraction; mock, simulated, and Pi backends
//! - `services` - Axum HTTP API and the shared serialization point (`web`)
//! - `scheduler` - Fixed-tick schedule runner (`web`)
//! - `logging` - Append-only file logging behind the `log` facade
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use pifeeder::hal::MockRelay;
//! use pifeeder::{FeedArbiter, FeedOutcome, FeedSource, StateStore};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = StateStore::new("storage/state.json");
//! let mut arbiter = FeedArbiter::new(store, MockRelay::new());
//!
//! match arbiter
//!     .attempt_feed(FeedSource::Manual, 2000, Utc::now())
//!     .await
//!     .unwrap()
//! {
//!     FeedOutcome::Allowed(receipt) => println!("fed {}ms", receipt.duration_ms),
//!     FeedOutcome::Denied(denial) => println!("denied: {}", denial.message),
//! }
//! # });
//! ```

#![warn(missing_docs)]

/// The feed arbitration engine.
pub mod arbiter;
/// Daemon configuration with builder-style sections.
pub mod config;
/// Relay backends: mock, simulated, and Raspberry Pi hardware.
pub mod hal;
/// Append-only file logging behind the `log` facade.
pub mod logging;
/// Schedule entries and boundary validation.
pub mod schedule;
/// Ultrasonic frame decoder and latest-sample monitor.
pub mod sensor;
/// Persisted feeder state and arbitration result types.
pub mod state;
/// JSON-file persistence for state and schedules.
pub mod store;
/// Hardware abstraction for the actuation primitive.
pub mod traits;

/// Fixed-tick schedule runner (feature-gated).
#[cfg(feature = "web")]
pub mod scheduler;
/// HTTP service layer (feature-gated).
#[cfg(feature = "web")]
pub mod services;

// Re-exports for convenience
pub use arbiter::{evaluate_rules, FeedArbiter};
pub use config::{Config, RelayConfig, SensorChannelMode, SensorConfig, StorageConfig, WebConfig};
pub use schedule::{ScheduleEntry, ScheduleError};
pub use sensor::{
    decode_frame, drain_frames, DrainReport, SensorError, SensorMode, SensorSample, SensorStatus,
    UltrasonicSensor,
};
pub use state::{
    DenyReason, FeedDenial, FeedOutcome, FeedReceipt, FeedSource, FeederState,
    DEFAULT_FEED_DURATION_MS,
};
pub use store::{ScheduleStore, StateStore, StoreError};
pub use traits::FeederRelay;

#[cfg(feature = "web")]
pub use services::SharedFeeder;

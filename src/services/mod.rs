//! HTTP service layer for the feeder daemon.
//!
//! Everything here is gated behind the `web` feature: the axum router, the
//! serde API types, and [`SharedFeeder`], the single serialization point
//! every trigger source goes through.
//!
//! # Shared State Pattern
//!
//! The HTTP handlers and the schedule runner must share one arbiter so the
//! safety rules see every request:
//!
//! ```ignore
//! use std::sync::Arc;
//! use pifeeder::services::{build_router, SharedFeeder};
//!
//! let shared = Arc::new(SharedFeeder::new(arbiter, sensor, schedules, log_path));
//!
//! // Web and the schedule runner both use the same state
//! let router = build_router(Arc::clone(&shared), &web_config);
//! let runner = pifeeder::scheduler::spawn_schedule_runner(Arc::clone(&shared));
//! ```

pub mod api;
pub mod shared;
pub mod web;

pub use api::*;
pub use shared::*;
pub use web::*;

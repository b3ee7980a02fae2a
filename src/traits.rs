//! Hardware abstraction for the feeder actuation primitive.
//!
//! The arbiter never touches GPIO directly; it drives a [`FeederRelay`] and
//! trusts the implementation's contract. This is what lets the whole
//! decision engine run and be tested on a desktop with the mock from
//! [`crate::hal`], the same way the real daemon runs it against a Raspberry
//! Pi pin (`hal::rpi`, `hardware` feature).

use core::future::Future;
use std::time::Duration;

/// The feeder actuation primitive: pulse the relay for a bounded duration.
///
/// # Contract
///
/// - `pulse` energizes the relay, holds it for `duration`, then releases it.
/// - The relay must end up released on **every** exit path, including
///   errors and cancellation; implementations should use a drop guard
///   rather than trusting straight-line code.
/// - The call may take the full `duration` to return. Callers bound it via
///   policy (`max_duration_ms`) and must tolerate the latency; there is no
///   cancellation once a pulse starts.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use std::convert::Infallible;
/// use std::time::Duration;
/// use pifeeder::FeederRelay;
///
/// struct MyRelay { /* pin handle */ }
///
/// impl FeederRelay for MyRelay {
///     type Error = Infallible;
///
///     async fn pulse(&mut self, duration: Duration) -> Result<(), Infallible> {
///         // energize, sleep, release (guarded)
///         Ok(())
///     }
/// }
/// ```
pub trait FeederRelay {
    /// Error type for actuation failures.
    ///
    /// `Display` because the arbiter records the message as `last_error`;
    /// `Send` so arbitration futures can cross task boundaries.
    type Error: core::fmt::Display + Send;

    /// Energize the relay for `duration`, then release it.
    fn pulse(
        &mut self,
        duration: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

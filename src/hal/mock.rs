//! Mock implementations for testing without hardware.
//!
//! [`MockRelay`] is the test double behind most of the arbiter test suite:
//! it records every pulse, can be told to fail, and never sleeps, so tests
//! exercise the full arbitration sequence in microseconds.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use pifeeder::hal::MockRelay;
//! use pifeeder::FeederRelay;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut relay = MockRelay::new();
//! relay.pulse(Duration::from_millis(2000)).await.unwrap();
//! assert_eq!(relay.pulses, vec![2000]);
//! # });
//! ```

use std::time::Duration;

use crate::traits::FeederRelay;

/// Mock relay for testing.
///
/// Records pulse durations for verification and completes immediately.
/// Set `fail_with` to make every subsequent pulse fail with that message,
/// simulating a dead relay or wiring fault.
#[derive(Debug, Default)]
pub struct MockRelay {
    /// Durations of every pulse requested, in milliseconds.
    pub pulses: Vec<u64>,
    /// When set, `pulse` fails with this message instead of succeeding.
    pub fail_with: Option<String>,
}

impl MockRelay {
    /// Creates a new mock relay that succeeds on every pulse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock relay that fails every pulse with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            pulses: Vec::new(),
            fail_with: Some(message.into()),
        }
    }

    /// Number of pulses that were attempted (including failed ones).
    pub fn pulse_count(&self) -> usize {
        self.pulses.len()
    }
}

impl FeederRelay for MockRelay {
    type Error = String;

    async fn pulse(&mut self, duration: Duration) -> Result<(), String> {
        self.pulses.push(duration.as_millis() as u64);
        match &self.fail_with {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_relay_records_pulses() {
        let mut relay = MockRelay::new();
        relay.pulse(Duration::from_millis(2000)).await.unwrap();
        relay.pulse(Duration::from_millis(500)).await.unwrap();

        assert_eq!(relay.pulses, vec![2000, 500]);
        assert_eq!(relay.pulse_count(), 2);
    }

    #[tokio::test]
    async fn mock_relay_failure_still_counts_attempt() {
        let mut relay = MockRelay::failing("relay stuck");
        let err = relay.pulse(Duration::from_millis(1000)).await.unwrap_err();

        assert_eq!(err, "relay stuck");
        assert_eq!(relay.pulse_count(), 1);
    }
}

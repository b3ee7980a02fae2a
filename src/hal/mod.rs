//! Hardware Abstraction Layer implementations.
//!
//! Concrete [`FeederRelay`](crate::traits::FeederRelay) backends:
//!
//! - `mock`: test doubles for desktop development and the test suite
//! - `rpi`: Raspberry Pi GPIO relay and UART sensor channel (requires the
//!   `hardware` feature)
//!
//! The daemon also ships a [`SimulatedRelay`] for running the full service
//! stack on a machine with no relay attached.

pub mod mock;

#[cfg(feature = "hardware")]
pub mod rpi;

pub use mock::*;

#[cfg(feature = "hardware")]
pub use rpi::*;

#[cfg(feature = "web")]
mod sim {
    use std::convert::Infallible;
    use std::time::Duration;

    use log::info;

    use crate::traits::FeederRelay;

    /// Relay stand-in for hosts without feeder hardware.
    ///
    /// Sleeps for the requested duration so the `is_feeding` window and the
    /// concurrent-request rejection behave exactly as they do against a
    /// real relay.
    #[derive(Debug, Default)]
    pub struct SimulatedRelay;

    impl SimulatedRelay {
        /// Creates a new simulated relay.
        pub fn new() -> Self {
            Self
        }
    }

    impl FeederRelay for SimulatedRelay {
        type Error = Infallible;

        async fn pulse(&mut self, duration: Duration) -> Result<(), Infallible> {
            info!("simulating feeder relay pulse for {}ms", duration.as_millis());
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

#[cfg(feature = "web")]
pub use sim::SimulatedRelay;

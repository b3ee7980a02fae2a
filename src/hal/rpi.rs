//! Raspberry Pi hardware backends (requires the `hardware` feature).
//!
//! Two pieces live here:
//!
//! - [`GpioRelay`]: drives the feeder relay on a GPIO line via rppal. Most
//!   relay boards are active-low, so that is the default.
//! - [`spawn_uart_reader`]: opens the ultrasonic sensor's serial port and
//!   feeds raw chunks into [`UltrasonicSensor::on_bytes`] from a dedicated
//!   reader thread.
//!
//! [`UltrasonicSensor::on_bytes`]: crate::sensor::UltrasonicSensor::on_bytes

use std::convert::Infallible;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use rppal::gpio::{Gpio, OutputPin};

use crate::sensor::UltrasonicSensor;
use crate::traits::FeederRelay;

/// Read timeout for the serial port; keeps the reader thread responsive
/// without spinning.
const UART_READ_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// Relay
// ============================================================================

/// Feeder relay on a Raspberry Pi GPIO line.
pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool,
}

impl GpioRelay {
    /// Claim `gpio` as an output and drive it to the released level.
    pub fn new(gpio: u8, active_low: bool) -> Result<Self, rppal::gpio::Error> {
        let mut pin = Gpio::new()?.get(gpio)?.into_output();
        write_level(&mut pin, active_low, false);
        info!(
            "feeder relay initialized on GPIO{} (active {})",
            gpio,
            if active_low { "LOW" } else { "HIGH" }
        );
        Ok(Self { pin, active_low })
    }
}

fn write_level(pin: &mut OutputPin, active_low: bool, energized: bool) {
    if energized != active_low {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

/// Forces the relay off when dropped, so an early return or a cancelled
/// pulse future can never leave the feeder running.
struct EnergizedGuard<'a> {
    pin: &'a mut OutputPin,
    active_low: bool,
}

impl Drop for EnergizedGuard<'_> {
    fn drop(&mut self) {
        write_level(self.pin, self.active_low, false);
    }
}

impl FeederRelay for GpioRelay {
    type Error = Infallible;

    async fn pulse(&mut self, duration: Duration) -> Result<(), Infallible> {
        let guard = EnergizedGuard {
            pin: &mut self.pin,
            active_low: self.active_low,
        };
        write_level(guard.pin, guard.active_low, true);
        tokio::time::sleep(duration).await;
        drop(guard);
        Ok(())
    }
}

impl Drop for GpioRelay {
    fn drop(&mut self) {
        write_level(&mut self.pin, self.active_low, false);
    }
}

// ============================================================================
// UART reader
// ============================================================================

/// Open the sensor's serial port and pump its bytes into the decoder.
///
/// Returns an error if the port cannot be opened; per the decoder's
/// availability contract the caller should then construct the sensor in
/// unavailable mode rather than retry. Read failures after a successful
/// open are recorded on the sensor's telemetry and the thread keeps going.
pub fn spawn_uart_reader(
    sensor: Arc<UltrasonicSensor>,
    path: &str,
    baud_rate: u32,
) -> Result<std::thread::JoinHandle<()>, serialport::Error> {
    let mut port = serialport::new(path, baud_rate)
        .timeout(UART_READ_TIMEOUT)
        .open()?;
    info!("ultrasonic sensor reading UART frames from {path} @ {baud_rate}bps");

    let handle = std::thread::Builder::new()
        .name("uart-reader".into())
        .spawn(move || {
            let mut chunk = [0u8; 64];
            loop {
                match port.read(&mut chunk) {
                    Ok(0) => {}
                    Ok(n) => sensor.on_bytes(&chunk[..n], Utc::now()),
                    Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(err) => {
                        warn!("serial read failed: {err}");
                        sensor.record_error(format!("serial read failed: {err}"));
                    }
                }
            }
        })
        .expect("spawning the uart reader thread");

    Ok(handle)
}

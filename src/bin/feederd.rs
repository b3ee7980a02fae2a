//! The feeder daemon.
//!
//! Wires the pieces together: env config, file logging, state recovery,
//! the ultrasonic sensor channel, the schedule runner, and the HTTP API.
//!
//! Without the `hardware` feature the relay is simulated (it sleeps for
//! the requested duration, so the concurrency behavior is faithful); the
//! full API and scheduler run anywhere for development.
//!
//! ```sh
//! cargo run --bin feederd
//! SENSOR_MODE=uart cargo run --bin feederd --features hardware
//! ```

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use log::{info, warn, LevelFilter};

use pifeeder::config::{Config, SensorChannelMode, SensorConfig};
use pifeeder::scheduler::spawn_schedule_runner;
use pifeeder::services::{run_server, SharedFeeder};
use pifeeder::{FeedArbiter, ScheduleStore, StateStore, UltrasonicSensor};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    pifeeder::logging::init(&config.storage.log_path, LevelFilter::Info)
        .context("initializing the feeder log")?;
    info!("pifeeder starting");

    let rt = tokio::runtime::Runtime::new().context("creating the tokio runtime")?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = StateStore::new(&config.storage.state_path);
    let schedules = ScheduleStore::new(&config.storage.schedules_path);
    let sensor = build_sensor(&config.sensor);

    let relay = build_relay(&config)?;
    let arbiter = FeedArbiter::new(store, relay);

    // An unclean shutdown mid-actuation leaves is_feeding set; clear it
    // before serving any request or the feeder stays locked out.
    if arbiter
        .recover_stale_feeding(Utc::now())
        .context("reconciling feeder state at startup")?
    {
        warn!("recovered from an unclean shutdown during a feed");
    }

    let shared = Arc::new(SharedFeeder::new(
        arbiter,
        sensor,
        schedules,
        &config.storage.log_path,
    ));

    spawn_schedule_runner(Arc::clone(&shared));
    info!("schedule runner started");

    run_server(shared, &config.web)
        .await
        .context("running the feeder API server")?;
    Ok(())
}

#[cfg(feature = "hardware")]
fn build_relay(config: &Config) -> anyhow::Result<pifeeder::hal::GpioRelay> {
    let relay = pifeeder::hal::GpioRelay::new(config.relay.gpio, config.relay.active_low)
        .context("claiming the feeder relay GPIO")?;
    Ok(relay)
}

#[cfg(not(feature = "hardware"))]
fn build_relay(_config: &Config) -> anyhow::Result<pifeeder::hal::SimulatedRelay> {
    info!("no hardware support compiled in; feeder relay is simulated");
    Ok(pifeeder::hal::SimulatedRelay::new())
}

fn build_sensor(config: &SensorConfig) -> Arc<UltrasonicSensor> {
    match config.mode {
        SensorChannelMode::Simulate => {
            info!("ultrasonic sensor running in simulate mode");
            Arc::new(UltrasonicSensor::simulate())
        }
        SensorChannelMode::Uart => open_uart_sensor(config),
    }
}

#[cfg(feature = "hardware")]
fn open_uart_sensor(config: &SensorConfig) -> Arc<UltrasonicSensor> {
    let sensor = Arc::new(UltrasonicSensor::uart(&config.uart_path, config.baud_rate));
    match pifeeder::hal::spawn_uart_reader(Arc::clone(&sensor), &config.uart_path, config.baud_rate)
    {
        Ok(_) => sensor,
        Err(err) => {
            // No fallback and no retry: the channel stays unavailable for
            // the life of the process, carrying the open error.
            warn!(
                "ultrasonic UART channel unavailable ({}): {err}",
                config.uart_path
            );
            Arc::new(UltrasonicSensor::unavailable(
                &config.uart_path,
                config.baud_rate,
                err.to_string(),
            ))
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn open_uart_sensor(config: &SensorConfig) -> Arc<UltrasonicSensor> {
    warn!("UART sensor mode requested but hardware support is not compiled in");
    Arc::new(UltrasonicSensor::unavailable(
        &config.uart_path,
        config.baud_rate,
        "serial support not compiled in (enable the hardware feature)",
    ))
}

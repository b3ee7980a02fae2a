//! Daemon configuration.
//!
//! Sectioned config with builder-style setters, plus [`Config::from_env`]
//! for the environment variables the deployed daemon is driven by.
//!
//! # Example
//!
//! ```rust
//! use pifeeder::config::{Config, SensorConfig, SensorChannelMode, WebConfig};
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Or customize
//! let config = Config::default()
//!     .with_web(WebConfig::default().with_port(3000))
//!     .with_sensor(SensorConfig::default().with_mode(SensorChannelMode::Uart));
//! ```

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Web server configuration.
    pub web: WebConfig,
    /// Ultrasonic sensor channel configuration.
    pub sensor: SensorConfig,
    /// Feeder relay wiring.
    pub relay: RelayConfig,
    /// On-disk file locations.
    pub storage: StorageConfig,
}

impl Config {
    /// Set web configuration.
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }

    /// Set sensor configuration.
    pub fn with_sensor(mut self, sensor: SensorConfig) -> Self {
        self.sensor = sensor;
        self
    }

    /// Set relay configuration.
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Set storage configuration.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Build a config from the daemon's environment variables.
    ///
    /// Unset or unparsable variables fall back to defaults:
    /// `FEEDER_HTTP_PORT`, `SENSOR_MODE` (`uart`/`simulate`),
    /// `SENSOR_UART_PATH`, `SENSOR_UART_BAUD`, `FEEDER_RELAY_GPIO`,
    /// `FEEDER_RELAY_ACTIVE_LOW`, `FEEDER_STATE_PATH`,
    /// `FEEDER_SCHEDULES_PATH`, `FEEDER_LOG_PATH`.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(port) = env_parse("FEEDER_HTTP_PORT") {
            config.web.port = port;
        }
        if let Ok(mode) = std::env::var("SENSOR_MODE") {
            if mode.eq_ignore_ascii_case("uart") {
                config.sensor.mode = SensorChannelMode::Uart;
            } else if mode.eq_ignore_ascii_case("simulate") {
                config.sensor.mode = SensorChannelMode::Simulate;
            }
        }
        if let Ok(path) = std::env::var("SENSOR_UART_PATH") {
            config.sensor.uart_path = path;
        }
        if let Some(baud) = env_parse("SENSOR_UART_BAUD") {
            config.sensor.baud_rate = baud;
        }
        if let Some(gpio) = env_parse("FEEDER_RELAY_GPIO") {
            config.relay.gpio = gpio;
        }
        if let Ok(active_low) = std::env::var("FEEDER_RELAY_ACTIVE_LOW") {
            config.relay.active_low = active_low.eq_ignore_ascii_case("true");
        }
        if let Ok(path) = std::env::var("FEEDER_STATE_PATH") {
            config.storage.state_path = path;
        }
        if let Ok(path) = std::env::var("FEEDER_SCHEDULES_PATH") {
            config.storage.schedules_path = path;
        }
        if let Ok(path) = std::env::var("FEEDER_LOG_PATH") {
            config.storage.log_path = path;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

// ============================================================================
// Web Config
// ============================================================================

/// Web server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebConfig {
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable CORS for all origins.
    pub cors_permissive: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_permissive: true,
        }
    }
}

impl WebConfig {
    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set CORS mode.
    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }
}

// ============================================================================
// Sensor Config
// ============================================================================

/// Which channel the ultrasonic sensor reads from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorChannelMode {
    /// Real UART frames from the serial device.
    Uart,
    /// Locally synthesized readings (no hardware needed).
    #[default]
    Simulate,
}

/// Ultrasonic sensor channel configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Configured channel mode.
    pub mode: SensorChannelMode,
    /// Serial device path for UART mode.
    pub uart_path: String,
    /// Baud rate for UART mode.
    pub baud_rate: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: SensorChannelMode::Simulate,
            uart_path: "/dev/ttyS0".into(),
            baud_rate: 9600,
        }
    }
}

impl SensorConfig {
    /// Set the channel mode.
    pub fn with_mode(mut self, mode: SensorChannelMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the serial device path.
    pub fn with_uart_path(mut self, path: &str) -> Self {
        self.uart_path = path.into();
        self
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

// ============================================================================
// Relay Config
// ============================================================================

/// Feeder relay wiring.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// BCM GPIO number driving the relay.
    pub gpio: u8,
    /// Most relay boards energize on a low level.
    pub active_low: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gpio: 12,
            active_low: true,
        }
    }
}

impl RelayConfig {
    /// Set the GPIO number.
    pub fn with_gpio(mut self, gpio: u8) -> Self {
        self.gpio = gpio;
        self
    }

    /// Set the active level.
    pub fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }
}

// ============================================================================
// Storage Config
// ============================================================================

/// On-disk file locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Feeder state record.
    pub state_path: String,
    /// Schedule list.
    pub schedules_path: String,
    /// Append-only log file (tailed by `GET /logs`).
    pub log_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: "storage/state.json".into(),
            schedules_path: "storage/schedules.json".into(),
            log_path: "logs/feeder.log".into(),
        }
    }
}

impl StorageConfig {
    /// Set the state file path.
    pub fn with_state_path(mut self, path: &str) -> Self {
        self.state_path = path.into();
        self
    }

    /// Set the schedules file path.
    pub fn with_schedules_path(mut self, path: &str) -> Self {
        self.schedules_path = path.into();
        self
    }

    /// Set the log file path.
    pub fn with_log_path(mut self, path: &str) -> Self {
        self.log_path = path.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

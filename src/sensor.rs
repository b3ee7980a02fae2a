//! Ultrasonic distance sensor: frame decoding and the latest-sample monitor.
//!
//! The A02-style sensor streams fixed 4-byte frames over UART:
//!
//! ```text
//! [0xFF header] [mm high byte] [mm low byte] [checksum]
//! checksum = (header + high + low) & 0xFF
//! ```
//!
//! Serial links corrupt and misalign; the parser is written to
//! resynchronize. It is a free function ([`drain_frames`]) over an explicit
//! residual buffer, so it can be unit-tested byte-for-byte without a serial
//! port. [`UltrasonicSensor`] wraps that parser behind a push interface
//! (`on_bytes`) and keeps only the most recent validated sample; readers
//! get point-in-time snapshots.
//!
//! # Example
//!
//! ```rust
//! use pifeeder::sensor::drain_frames;
//!
//! // Two garbage bytes, then a valid 100mm frame.
//! let mut buf = vec![0x01, 0x02, 0xFF, 0x00, 0x64, 0x63];
//! let report = drain_frames(&mut buf);
//!
//! assert_eq!(report.samples, vec![10.0]);
//! assert_eq!(report.discarded, 2);
//! assert!(buf.is_empty());
//! ```

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Start-of-frame marker.
pub const FRAME_HEADER: u8 = 0xFF;
/// Fixed frame length in bytes.
pub const FRAME_LEN: usize = 4;
/// Sensor physical floor, centimeters.
pub const MIN_DISTANCE_CM: f64 = 3.0;
/// Sensor physical ceiling, centimeters.
pub const MAX_DISTANCE_CM: f64 = 450.0;

// ============================================================================
// Frame parsing (pure)
// ============================================================================

/// Decode one candidate frame into a distance in centimeters.
///
/// Returns `None` on a bad header or checksum. The raw value is big-endian
/// millimeters; the result is centimeters with one decimal, clamped to the
/// sensor's physical range.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Option<f64> {
    let [header, high, low, checksum] = *frame;
    if header != FRAME_HEADER {
        return None;
    }
    if checksum != header.wrapping_add(high).wrapping_add(low) {
        return None;
    }
    let raw_mm = u16::from_be_bytes([high, low]);
    Some((f64::from(raw_mm) / 10.0).clamp(MIN_DISTANCE_CM, MAX_DISTANCE_CM))
}

/// What one pass of [`drain_frames`] produced.
#[derive(Debug, Default, PartialEq)]
pub struct DrainReport {
    /// Distances decoded from valid frames, in arrival order (centimeters).
    pub samples: Vec<f64>,
    /// Bytes dropped while resynchronizing (garbage prefixes, rejected
    /// headers, headerless buffers).
    pub discarded: usize,
}

/// Extract every complete frame currently in `buf`, resynchronizing past
/// corrupt or misaligned data.
///
/// The buffer is the parser's only state; append incoming chunks to it and
/// call this once per chunk. On return `buf` holds at most a partial frame
/// (fewer than [`FRAME_LEN`] bytes) waiting for more data.
///
/// - No `0xFF` in a full-length buffer: nothing is salvageable, the whole
///   buffer is dropped.
/// - Garbage before the first `0xFF`: dropped, frame alignment recovered.
/// - Checksum failure: only the header byte is dropped, and the scan
///   resumes; a real header may hide inside the rejected bytes.
pub fn drain_frames(buf: &mut Vec<u8>) -> DrainReport {
    let mut report = DrainReport::default();

    while buf.len() >= FRAME_LEN {
        match buf.iter().position(|&b| b == FRAME_HEADER) {
            None => {
                report.discarded += buf.len();
                buf.clear();
                break;
            }
            Some(0) => {}
            Some(garbage) => {
                report.discarded += garbage;
                buf.drain(..garbage);
            }
        }

        if buf.len() < FRAME_LEN {
            break;
        }

        let frame = [buf[0], buf[1], buf[2], buf[3]];
        match decode_frame(&frame) {
            Some(distance_cm) => {
                buf.drain(..FRAME_LEN);
                report.samples.push(distance_cm);
            }
            None => {
                report.discarded += 1;
                buf.drain(..1);
            }
        }
    }

    report
}

// ============================================================================
// Sample and status types
// ============================================================================

/// How a distance reading was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorMode {
    /// Decoded from UART frames.
    Uart,
    /// Synthesized locally (no sensor attached).
    Simulate,
    /// The serial channel could not be opened; no readings for the life of
    /// the process.
    Unavailable,
}

/// One validated distance reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSample {
    /// Distance in centimeters, one decimal.
    pub distance_cm: f64,
    /// How the reading was produced.
    pub mode: SensorMode,
    /// When the reading was decoded.
    pub measured_at: DateTime<Utc>,
}

/// Why a read produced no sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensorError {
    /// The stream has not yet produced a single valid frame.
    NoReadingYet,
    /// The channel never opened; carries the captured open error.
    Unavailable(String),
}

impl SensorError {
    /// Machine-readable reason code for the HTTP layer.
    pub fn reason(&self) -> &'static str {
        match self {
            SensorError::NoReadingYet => "NO_READING_YET",
            SensorError::Unavailable(_) => "SENSOR_UNAVAILABLE",
        }
    }
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SensorError::NoReadingYet => {
                f.write_str("waiting for first valid frame from ultrasonic sensor")
            }
            SensorError::Unavailable(err) => write!(f, "ultrasonic sensor unavailable: {err}"),
        }
    }
}

impl std::error::Error for SensorError {}

/// UART channel details reported in [`SensorStatus`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UartStatus {
    /// Serial device path.
    pub path: String,
    /// Configured baud rate.
    pub baud_rate: u32,
    /// Whether the channel opened successfully.
    pub connected: bool,
}

/// Decoder health snapshot for `GET /sensor/status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStatus {
    /// Active mode for this process.
    pub mode: SensorMode,
    /// Most recent validated distance, if any.
    pub last_distance_cm: Option<f64>,
    /// When it was decoded.
    pub last_read_at: Option<DateTime<Utc>>,
    /// Most recent decode or channel error, cleared by a valid frame.
    pub last_error: Option<String>,
    /// Valid frames decoded since start.
    pub frames_decoded: u64,
    /// Bytes dropped during resynchronization since start.
    pub bytes_discarded: u64,
    /// UART channel details, absent in simulate mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uart: Option<UartStatus>,
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug, Default)]
struct DecoderInner {
    buffer: Vec<u8>,
    last_sample: Option<SensorSample>,
    last_error: Option<String>,
    frames_decoded: u64,
    bytes_discarded: u64,
}

/// Latest-sample monitor over the frame decoder.
///
/// Owns the residual buffer and the most recent validated sample. The
/// serial reader pushes chunks in via [`on_bytes`](Self::on_bytes); status
/// reporters poll [`read_distance`](Self::read_distance) and
/// [`status`](Self::status) and get snapshots. The internal mutex guards
/// only the decoder state; the sensor path shares nothing with the feed
/// arbiter.
#[derive(Debug)]
pub struct UltrasonicSensor {
    mode: SensorMode,
    uart: Option<(String, u32)>,
    open_error: Option<String>,
    inner: Mutex<DecoderInner>,
}

impl UltrasonicSensor {
    /// Sensor fed by a UART channel at `path` / `baud_rate`.
    pub fn uart(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            mode: SensorMode::Uart,
            uart: Some((path.into(), baud_rate)),
            open_error: None,
            inner: Mutex::new(DecoderInner::default()),
        }
    }

    /// Sensor that synthesizes readings locally (no hardware attached).
    pub fn simulate() -> Self {
        Self {
            mode: SensorMode::Simulate,
            uart: None,
            open_error: None,
            inner: Mutex::new(DecoderInner::default()),
        }
    }

    /// Sensor whose channel failed to open.
    ///
    /// Permanent for the process lifetime; every read returns
    /// [`SensorError::Unavailable`] with the captured error. No retry loop.
    pub fn unavailable(path: impl Into<String>, baud_rate: u32, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            mode: SensorMode::Unavailable,
            uart: Some((path.into(), baud_rate)),
            open_error: Some(error.clone()),
            inner: Mutex::new(DecoderInner {
                last_error: Some(error),
                ..DecoderInner::default()
            }),
        }
    }

    /// Active mode for this process.
    pub fn mode(&self) -> SensorMode {
        self.mode
    }

    /// Feed a chunk of raw serial bytes into the decoder.
    ///
    /// Runs the parser over the residual buffer and keeps the newest
    /// validated sample. A valid frame clears any prior error; a chunk that
    /// only produced discards records one for telemetry (discards are never
    /// surfaced to readers).
    pub fn on_bytes(&self, chunk: &[u8], now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.extend_from_slice(chunk);
        let report = drain_frames(&mut inner.buffer);

        inner.frames_decoded += report.samples.len() as u64;
        inner.bytes_discarded += report.discarded as u64;

        if let Some(&distance_cm) = report.samples.last() {
            inner.last_sample = Some(SensorSample {
                distance_cm,
                mode: SensorMode::Uart,
                measured_at: now,
            });
            inner.last_error = None;
        } else if report.discarded > 0 {
            inner.last_error = Some(format!(
                "discarded {} byte(s) while resynchronizing",
                report.discarded
            ));
        }
    }

    /// Record a channel-level error on the telemetry (reader thread use).
    pub fn record_error(&self, message: impl Into<String>) {
        self.inner.lock().unwrap().last_error = Some(message.into());
    }

    /// The most recent validated reading.
    ///
    /// UART mode returns the latest decoded sample, or
    /// [`SensorError::NoReadingYet`] before the first valid frame, never a
    /// stale default. Simulate mode synthesizes a fresh in-range reading.
    pub fn read_distance(&self, now: DateTime<Utc>) -> Result<SensorSample, SensorError> {
        match self.mode {
            SensorMode::Unavailable => Err(SensorError::Unavailable(
                self.open_error.clone().unwrap_or_default(),
            )),
            SensorMode::Uart => {
                let inner = self.inner.lock().unwrap();
                inner.last_sample.clone().ok_or(SensorError::NoReadingYet)
            }
            SensorMode::Simulate => {
                let sample = simulated_sample(now);
                self.inner.lock().unwrap().last_sample = Some(sample.clone());
                Ok(sample)
            }
        }
    }

    /// Decoder health snapshot.
    pub fn status(&self) -> SensorStatus {
        let inner = self.inner.lock().unwrap();
        SensorStatus {
            mode: self.mode,
            last_distance_cm: inner.last_sample.as_ref().map(|s| s.distance_cm),
            last_read_at: inner.last_sample.as_ref().map(|s| s.measured_at),
            last_error: inner.last_error.clone(),
            frames_decoded: inner.frames_decoded,
            bytes_discarded: inner.bytes_discarded,
            uart: self.uart.as_ref().map(|(path, baud_rate)| UartStatus {
                path: path.clone(),
                baud_rate: *baud_rate,
                connected: self.mode == SensorMode::Uart,
            }),
        }
    }
}

/// Deterministic slow wave across the sensor's range, for hosts with no
/// sensor attached. One full sweep roughly every 94 seconds.
fn simulated_sample(now: DateTime<Utc>) -> SensorSample {
    let seconds = now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0;
    let wave = ((seconds / 15.0).sin() + 1.0) / 2.0;
    let distance_cm = MIN_DISTANCE_CM + wave * (MAX_DISTANCE_CM - MIN_DISTANCE_CM);
    SensorSample {
        distance_cm: (distance_cm * 10.0).round() / 10.0,
        mode: SensorMode::Simulate,
        measured_at: now,
    }
}

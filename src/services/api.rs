//! API request and response types for the HTTP surface.
//!
//! The wire contract mirrors the feeder's long-standing JSON shapes: every
//! body carries an `ok` flag, denials flatten the [`FeedDenial`] payload
//! next to it, and unexpected faults become `{ok:false, error, detail}`.

use serde::{Deserialize, Serialize};

use crate::sensor::{SensorSample, SensorStatus};
use crate::state::{FeedDenial, FeedReceipt, FeederState};

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /feed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedRequest {
    /// Pulse duration; defaults to
    /// [`DEFAULT_FEED_DURATION_MS`](crate::state::DEFAULT_FEED_DURATION_MS).
    #[serde(default)]
    pub duration: Option<u64>,
}

/// Body of `POST /schedules/delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteScheduleRequest {
    /// Id of the entry to remove.
    pub id: String,
}

/// Query parameters of `GET /logs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    /// How many lines to return (default 100).
    #[serde(default)]
    pub lines: Option<usize>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Plain `{ok: true}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkBody {
    /// Always true.
    pub ok: bool,
}

impl OkBody {
    /// The acknowledgement.
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkBody {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful feed: `{ok: true, result: <receipt>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedBody {
    /// Always true.
    pub ok: bool,
    /// The actuation record.
    pub result: FeedReceipt,
}

impl FeedBody {
    /// Wrap a receipt.
    pub fn new(result: FeedReceipt) -> Self {
        Self { ok: true, result }
    }
}

/// Denied feed: `{ok: false, reason, message, ...payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialBody {
    /// Always false.
    pub ok: bool,
    /// The denial, flattened into the body.
    #[serde(flatten)]
    pub denial: FeedDenial,
}

impl DenialBody {
    /// Wrap a denial.
    pub fn new(denial: FeedDenial) -> Self {
        Self { ok: false, denial }
    }
}

/// Unexpected failure: `{ok: false, error, detail?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always false.
    pub ok: bool,
    /// Short error description.
    pub error: String,
    /// Underlying cause, when useful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    /// Error with no detail.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            detail: None,
        }
    }

    /// Error with an underlying cause.
    pub fn with_detail(error: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            error: error.into(),
            detail: Some(detail.to_string()),
        }
    }
}

/// `GET /status` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    /// Always true.
    pub ok: bool,
    /// Full feeder state snapshot.
    pub state: FeederState,
    /// Sensor health snapshot.
    pub sensor: SensorStatus,
}

/// `GET /sensor/distance` success payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceBody {
    /// Always true.
    pub ok: bool,
    /// The latest validated sample.
    pub result: SensorSample,
}

/// Sensor read failure: `{ok: false, reason, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorErrorBody {
    /// Always false.
    pub ok: bool,
    /// Machine-readable reason (`NO_READING_YET`, `SENSOR_UNAVAILABLE`).
    pub reason: String,
    /// Human-readable explanation.
    pub message: String,
}

/// `POST /disable` / `POST /enable` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableBody {
    /// Always true.
    pub ok: bool,
    /// What happened.
    pub message: String,
    /// When feeding resumes; absent after enable.
    pub disabled_until: Option<chrono::DateTime<chrono::Utc>>,
}

/// `GET /logs` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsBody {
    /// Always true.
    pub ok: bool,
    /// The requested tail, oldest first.
    pub logs: Vec<String>,
    /// Lines in the whole file.
    pub total_lines: usize,
    /// Lines actually returned.
    pub returned_lines: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DenyReason, FeedSource};
    use chrono::{TimeZone, Utc};

    #[test]
    fn feed_request_duration_is_optional() {
        let req: FeedRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.duration, None);

        let req: FeedRequest = serde_json::from_str(r#"{"duration": 3000}"#).unwrap();
        assert_eq!(req.duration, Some(3000));
    }

    #[test]
    fn denial_body_flattens_payload() {
        let mut denial = FeedDenial::new(DenyReason::DailyLimitReached, "limit");
        denial.feeds_today = Some(5);

        let json = serde_json::to_string(&DenialBody::new(denial)).unwrap();
        assert!(json.contains(r#""ok":false"#));
        assert!(json.contains(r#""reason":"DAILY_LIMIT_REACHED""#));
        assert!(json.contains(r#""feedsToday":5"#));
    }

    #[test]
    fn feed_body_wraps_receipt() {
        let receipt = FeedReceipt {
            source: FeedSource::Manual,
            duration_ms: 2000,
            fed_at: Utc.with_ymd_and_hms(2026, 8, 8, 9, 0, 0).unwrap(),
            feeds_today: 1,
        };
        let json = serde_json::to_string(&FeedBody::new(receipt)).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""source":"MANUAL""#));
        assert!(json.contains(r#""durationMs":2000"#));
    }

    #[test]
    fn error_body_omits_missing_detail() {
        let json = serde_json::to_string(&ErrorBody::new("boom")).unwrap();
        assert!(!json.contains("detail"));

        let json = serde_json::to_string(&ErrorBody::with_detail("boom", "cause")).unwrap();
        assert!(json.contains(r#""detail":"cause""#));
    }
}

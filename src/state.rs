//! Persisted feeder state and arbitration result types.
//!
//! [`FeederState`] is the single durable record behind every feed decision.
//! It is read before each decision and written back after each state change
//! (whole-record read-modify-write, never partial patches). The wire format
//! is camelCase JSON so the on-disk `state.json` stays human-readable.
//!
//! Arbitration results are values, not errors: a denied feed comes back as
//! [`FeedOutcome::Denied`] carrying a machine-readable [`DenyReason`] plus a
//! human message, so trigger sources (HTTP, scheduler) can report the single
//! most relevant cause without unwinding.

use core::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Minimum spacing between any two successful feeds (1 hour).
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 3_600_000;
/// Additional spacing between two manual-origin feeds (5 minutes).
pub const DEFAULT_MANUAL_COOLDOWN_MS: u64 = 300_000;
/// Maximum successful feeds per UTC day.
pub const DEFAULT_MAX_DAILY_FEEDS: u32 = 5;
/// Maximum single actuation duration accepted by the arbiter.
pub const DEFAULT_MAX_DURATION_MS: u64 = 5_000;
/// Duration used by `POST /feed` when the request omits one.
pub const DEFAULT_FEED_DURATION_MS: u64 = 2_000;

// ============================================================================
// FeederState
// ============================================================================

/// The single persisted feeder record.
///
/// One instance per process, mutated in place and written back whole. All
/// timestamps are UTC; `feeds_today` rolls over with the UTC calendar date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeederState {
    /// Master kill switch. When false, every feed request is denied.
    pub enabled: bool,
    /// Temporary suspension; auto-cleared on the next read once passed.
    pub disabled_until: Option<DateTime<Utc>>,
    /// True only while an actuation is physically in flight.
    pub is_feeding: bool,
    /// Most recent successful actuation, any source.
    pub last_feed_at: Option<DateTime<Utc>>,
    /// Most recent successful manual actuation.
    pub last_manual_feed_at: Option<DateTime<Utc>>,
    /// Durable pre-commit marker written just before actuation starts.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Source of the most recent successful feed.
    pub last_source: Option<FeedSource>,
    /// Message of the most recent actuation failure, cleared on success.
    pub last_error: Option<String>,
    /// Successful feeds since the last daily reset.
    pub feeds_today: u32,
    /// UTC date the daily counter was last zeroed.
    pub last_reset_date: Option<NaiveDate>,
    /// Lifetime successful feed count.
    pub feed_count: u64,
    /// Minimum spacing between any two successful feeds.
    pub min_interval_ms: u64,
    /// Additional minimum spacing between two manual feeds.
    pub manual_cooldown_ms: u64,
    /// Daily feed budget.
    pub max_daily_feeds: u32,
    /// Upper bound on a single actuation duration.
    pub max_duration_ms: u64,
}

impl Default for FeederState {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_until: None,
            is_feeding: false,
            last_feed_at: None,
            last_manual_feed_at: None,
            last_attempt_at: None,
            last_source: None,
            last_error: None,
            feeds_today: 0,
            last_reset_date: None,
            feed_count: 0,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            manual_cooldown_ms: DEFAULT_MANUAL_COOLDOWN_MS,
            max_daily_feeds: DEFAULT_MAX_DAILY_FEEDS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
        }
    }
}

impl FeederState {
    /// Zero the daily counter if `today` differs from the recorded reset
    /// date. Returns true when the record changed and needs persisting.
    ///
    /// Must run before any safety check so the limit applies to the current
    /// calendar day.
    pub fn roll_daily_counter(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date == Some(today) {
            return false;
        }
        self.feeds_today = 0;
        self.last_reset_date = Some(today);
        true
    }

    /// Clear an expired suspension. Returns true when the record changed.
    ///
    /// A `disabled_until` in the past must never be left stale; the next
    /// read removes it rather than waiting for an explicit enable.
    pub fn clear_expired_suspension(&mut self, now: DateTime<Utc>) -> bool {
        match self.disabled_until {
            Some(until) if until <= now => {
                self.disabled_until = None;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// FeedSource
// ============================================================================

/// Origin of a feed request.
///
/// Manual and scheduled triggers flow through the same arbitration entry
/// point; the source only matters for the manual cooldown rule and for
/// record keeping. Serialized as `"MANUAL"` or `"SCHEDULE:<id>"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedSource {
    /// User-initiated request (HTTP `POST /feed`).
    Manual,
    /// Fired by the schedule runner; carries the schedule entry id.
    Schedule(String),
}

impl FeedSource {
    /// Parse the wire form back into a source.
    ///
    /// Accepts `"MANUAL"` and `"SCHEDULE:<id>"`; anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "MANUAL" {
            Some(FeedSource::Manual)
        } else {
            s.strip_prefix("SCHEDULE:")
                .map(|id| FeedSource::Schedule(id.to_string()))
        }
    }

    /// True for [`FeedSource::Manual`].
    pub fn is_manual(&self) -> bool {
        matches!(self, FeedSource::Manual)
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Manual => f.write_str("MANUAL"),
            FeedSource::Schedule(id) => write!(f, "SCHEDULE:{id}"),
        }
    }
}

impl Serialize for FeedSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeedSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FeedSource::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown feed source: {s}")))
    }
}

// ============================================================================
// Arbitration results
// ============================================================================

/// Machine-readable cause of a denied feed.
///
/// Wire values match the `reason` codes the HTTP layer returns
/// (`"FEEDING_DISABLED"`, `"MIN_INTERVAL_NOT_REACHED"`, ...). The variants
/// are listed in evaluation order; the first failing rule wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// Master switch is off.
    FeedingDisabled,
    /// `disabled_until` is set and still in the future.
    TemporarilyDisabled,
    /// An actuation is already in flight; concurrent requests are rejected,
    /// never queued or merged.
    AlreadyFeeding,
    /// Manual request inside the manual-only cooldown window.
    ManualCooldown,
    /// Any request inside the global minimum interval.
    MinIntervalNotReached,
    /// Daily feed budget exhausted.
    DailyLimitReached,
    /// Requested duration is zero or exceeds the policy maximum.
    InvalidDuration,
    /// The relay pulse itself failed.
    ActuationFailed,
}

/// A denied feed: reason code, human message, and rule-specific payload.
///
/// Optional fields are omitted from JSON when absent so each denial carries
/// only the payload relevant to its rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDenial {
    /// Which rule fired.
    pub reason: DenyReason,
    /// Human-readable explanation of the specific cause.
    pub message: String,
    /// Whole minutes until the suspension or cooldown ends (rules b and d).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_remaining: Option<i64>,
    /// Whole minutes until the minimum interval allows feeding again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_until_next_feed: Option<i64>,
    /// When the suspension lifts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<DateTime<Utc>>,
    /// When the previous successful feed ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_feed_time: Option<DateTime<Utc>>,
    /// Daily counter at the time of denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeds_today: Option<u32>,
    /// The duration that was asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_duration_ms: Option<u64>,
    /// The policy maximum it was checked against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
}

impl FeedDenial {
    /// Denial with a reason and message and no extra payload.
    pub fn new(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            minutes_remaining: None,
            minutes_until_next_feed: None,
            disabled_until: None,
            last_feed_time: None,
            feeds_today: None,
            requested_duration_ms: None,
            max_duration_ms: None,
        }
    }
}

/// Record of a successful actuation, returned to the trigger source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedReceipt {
    /// Who asked for the feed.
    pub source: FeedSource,
    /// How long the relay was pulsed.
    pub duration_ms: u64,
    /// When the feed was recorded.
    pub fed_at: DateTime<Utc>,
    /// Daily counter after this feed.
    pub feeds_today: u32,
}

/// Result of one pass through the arbitration engine.
///
/// Both variants are ordinary outcomes; storage faults are the only thing
/// surfaced as `Err` by [`FeedArbiter::attempt_feed`].
///
/// [`FeedArbiter::attempt_feed`]: crate::arbiter::FeedArbiter::attempt_feed
#[derive(Clone, Debug, PartialEq)]
pub enum FeedOutcome {
    /// Actuation ran and state was advanced.
    Allowed(FeedReceipt),
    /// A safety rule fired, or actuation itself failed.
    Denied(FeedDenial),
}

impl FeedOutcome {
    /// True when the feed ran.
    pub fn is_allowed(&self) -> bool {
        matches!(self, FeedOutcome::Allowed(_))
    }

    /// The denial, if any.
    pub fn denial(&self) -> Option<&FeedDenial> {
        match self {
            FeedOutcome::Allowed(_) => None,
            FeedOutcome::Denied(denial) => Some(denial),
        }
    }
}

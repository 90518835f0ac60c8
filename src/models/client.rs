use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in one day, the unit of the auto-delete threshold.
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// A proxy client credential scoped to one inbound.
///
/// `email` is the identity key. It is unique within an inbound but the same
/// email may appear in several inbounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub inbound_id: i64,
    pub email: String,
    pub enabled: bool,
    /// Traffic quota in bytes (0 = unlimited)
    pub total_bytes: i64,
    /// Absolute expiry in epoch milliseconds (0 = never expires)
    pub expiry_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClient {
    pub inbound_id: i64,
    pub email: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub total_bytes: i64,
    #[serde(default)]
    pub expiry_time: i64,
}

fn default_enabled() -> bool {
    true
}

/// Cumulative traffic counters for one client since the last reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTraffic {
    pub inbound_id: i64,
    pub email: String,
    pub up_bytes: i64,
    pub down_bytes: i64,
}

/// A client joined with its traffic row.
///
/// Clients without a traffic row never produce a `ClientUsage`, so they can
/// never be selected for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientUsage {
    pub inbound_id: i64,
    pub email: String,
    pub enabled: bool,
    pub total_bytes: i64,
    pub expiry_time: i64,
    pub up_bytes: i64,
    pub down_bytes: i64,
}

impl ClientUsage {
    /// Upload plus download since the last reset.
    pub fn used_bytes(&self) -> i64 {
        self.up_bytes.saturating_add(self.down_bytes)
    }

    /// Whether the traffic quota is set and fully consumed (inclusive).
    pub fn is_quota_exhausted(&self) -> bool {
        self.total_bytes > 0 && self.used_bytes() >= self.total_bytes
    }

    /// Whether the client expired before `expiry_limit_ms`.
    pub fn is_expired_before(&self, expiry_limit_ms: i64) -> bool {
        self.expiry_time != 0 && self.expiry_time < expiry_limit_ms
    }

    /// Classify why this client is eligible for deletion, if it is.
    ///
    /// Only the expiry branch is shifted by the threshold; the quota branch
    /// compares against the raw counters.
    pub fn depletion(&self, expiry_limit_ms: i64) -> Option<DepletionReason> {
        if !self.enabled {
            return None;
        }
        match (
            self.is_quota_exhausted(),
            self.is_expired_before(expiry_limit_ms),
        ) {
            (true, true) => Some(DepletionReason::QuotaExhaustedAndExpired),
            (true, false) => Some(DepletionReason::QuotaExhausted),
            (false, true) => Some(DepletionReason::Expired),
            (false, false) => None,
        }
    }
}

/// Why a client was selected for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepletionReason {
    QuotaExhausted,
    Expired,
    QuotaExhaustedAndExpired,
}

impl DepletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepletionReason::QuotaExhausted => "quota_exhausted",
            DepletionReason::Expired => "expired",
            DepletionReason::QuotaExhaustedAndExpired => "quota_exhausted_and_expired",
        }
    }
}

impl std::fmt::Display for DepletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the expiry cutoff for a given threshold.
///
/// Clients whose `expiry_time` is strictly before the returned value
/// (epoch millis) have been expired for more than `threshold_days` days.
pub fn expiry_limit_ms(now: DateTime<Utc>, threshold_days: i64) -> i64 {
    now.timestamp_millis()
        .saturating_sub(threshold_days.saturating_mul(MILLIS_PER_DAY))
}

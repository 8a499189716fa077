use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SECONDS_PER_DAY: i64 = 86400;

/// Plan tier determining how expiry is computed at creation/edit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Monthly,
    Yearly,
    Lifetime,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "monthly",
            Plan::Yearly => "yearly",
            Plan::Lifetime => "lifetime",
        }
    }

    /// Absolute expiry instant for a license starting at `now`.
    /// `None` means the license never expires.
    pub fn expiry_from(&self, now: i64) -> Option<i64> {
        match self {
            Plan::Monthly => Some(now + 30 * SECONDS_PER_DAY),
            Plan::Yearly => Some(now + 365 * SECONDS_PER_DAY),
            Plan::Lifetime => None,
        }
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Plan::Monthly),
            "yearly" => Ok(Plan::Yearly),
            "lifetime" => Ok(Plan::Lifetime),
            other => Err(format!("unknown plan: {}", other)),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single validation attempt, stored verbatim in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Success,
    Invalid,
    Revoked,
    Expired,
    WrongDevice,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Success => "SUCCESS",
            ValidationStatus::Invalid => "INVALID",
            ValidationStatus::Revoked => "REVOKED",
            ValidationStatus::Expired => "EXPIRED",
            ValidationStatus::WrongDevice => "WRONG_DEVICE",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ValidationStatus::Success),
            "INVALID" => Ok(ValidationStatus::Invalid),
            "REVOKED" => Ok(ValidationStatus::Revoked),
            "EXPIRED" => Ok(ValidationStatus::Expired),
            "WRONG_DEVICE" => Ok(ValidationStatus::WrongDevice),
            other => Err(format!("unknown validation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    /// Opaque human-typable key (PREFIX-XXXX-XXXX-XXXX-XXXX), unique.
    pub key: String,
    pub plan: Plan,
    pub owner: String,
    /// Bound device identifier. Empty until first activation; once set it
    /// only changes via an explicit admin device reset.
    pub hw_id: String,
    pub created_at: i64,
    /// None = never expires (lifetime).
    pub expires_at: Option<i64>,
    pub revoked: bool,
    pub last_seen: Option<i64>,
    pub activations: i64,
    pub first_activation: Option<i64>,
    pub device_info: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub id: String,
    /// None = attempt against a key that does not exist (sentinel).
    pub license_id: Option<String>,
    /// The key as presented by the caller, kept even for unknown keys so
    /// failed attempts stay attributable.
    pub license_key: String,
    pub timestamp: i64,
    pub hw_id: String,
    pub ip_address: String,
    pub device_info: String,
    pub user_agent: String,
    pub status: ValidationStatus,
    pub error_detail: String,
    pub app_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceHistory {
    pub id: String,
    pub license_id: String,
    pub hw_id: String,
    pub device_info: String,
    pub first_seen: i64,
    pub last_seen: i64,
    /// Distinct IPs seen from this device, insertion-ordered.
    pub ip_addresses: Vec<String>,
    pub total_uses: i64,
    /// At most one row per license carries this flag.
    pub is_current: bool,
}

/// Everything the validation engine needs to know about one attempt.
#[derive(Debug, Clone)]
pub struct ValidationAttempt<'a> {
    pub key: &'a str,
    pub hw_id: &'a str,
    pub ip: &'a str,
    pub device_info: &'a str,
    pub user_agent: &'a str,
    pub app_version: &'a str,
}

/// Result of running the validation state machine for one call.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// Device matched (or was just bound); carries the post-update license.
    Granted(License),
    Rejected(ValidationStatus),
}

/// Expiry as exposed over the wire: a unix timestamp or the literal
/// string "lifetime".
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum ExpiryRepr {
    At(i64),
    Lifetime(&'static str),
}

impl From<Option<i64>> for ExpiryRepr {
    fn from(expires_at: Option<i64>) -> Self {
        match expires_at {
            Some(ts) => ExpiryRepr::At(ts),
            None => ExpiryRepr::Lifetime("lifetime"),
        }
    }
}

/// Per-license tallies for the admin detail view.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseStats {
    pub total_attempts: i64,
    pub successful: i64,
    pub failed: i64,
    pub unique_ips: i64,
    pub unique_devices: i64,
}

/// One heuristic flag from the suspicious-activity scan.
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousLicense {
    pub key: String,
    pub owner: String,
    pub reason: String,
    pub devices: i64,
    pub severity: &'static str,
}

/// Aggregate counters for the admin summary view.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub total_licenses: i64,
    pub active_last_24h: i64,
    pub active_last_7d: i64,
    pub inactive_7d: i64,
    pub validation_attempts_24h: i64,
    pub successful_24h: i64,
    pub failed_24h: i64,
}

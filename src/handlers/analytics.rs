//! Read-only admin aggregations: per-license detail, the suspicious
//! activity scan, and the overall summary. Derived views, no stored state.

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::{ActivityLog, DeviceHistory, LicenseStats, ValidationStatus};

use super::admin::LicenseView;

/// Activity rows kept in the detail response.
const RECENT_ACTIVITY_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub timestamp: i64,
    pub status: ValidationStatus,
    pub hw_id: String,
    pub ip: String,
    pub device_info: String,
    pub error_detail: String,
    pub app_version: String,
}

impl From<ActivityLog> for ActivityEntry {
    fn from(log: ActivityLog) -> Self {
        // Long hardware ids are noise in the activity listing.
        let hw_id = if log.hw_id.chars().count() > 20 {
            format!("{}...", log.hw_id.chars().take(20).collect::<String>())
        } else {
            log.hw_id
        };
        ActivityEntry {
            timestamp: log.timestamp,
            status: log.status,
            hw_id,
            ip: log.ip_address,
            device_info: log.device_info,
            error_detail: log.error_detail,
            app_version: log.app_version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub hw_id: String,
    pub device_info: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub total_uses: i64,
    pub is_current: bool,
    pub ip_addresses: Vec<String>,
}

impl From<DeviceHistory> for DeviceView {
    fn from(device: DeviceHistory) -> Self {
        DeviceView {
            hw_id: device.hw_id,
            device_info: device.device_info,
            first_seen: device.first_seen,
            last_seen: device.last_seen,
            total_uses: device.total_uses,
            is_current: device.is_current,
            ip_addresses: device.ip_addresses,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LicenseDetail {
    pub license: LicenseView,
    pub statistics: LicenseStats,
    pub recent_activity: Vec<ActivityEntry>,
    pub devices: Vec<DeviceView>,
}

pub async fn license_detail(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseDetail>> {
    let key = key.trim().to_uppercase();
    let conn = state.db.get()?;

    let Some(license) = queries::get_license_by_key(&conn, &key)? else {
        return Err(AppError::NotFound(format!("license {}", key)));
    };

    let statistics = queries::license_stats(&conn, &license.id)?;
    let recent_activity = queries::recent_activity(&conn, &license.id, RECENT_ACTIVITY_LIMIT)?;
    let devices = queries::devices_for_license(&conn, &license.id)?;

    Ok(Json(LicenseDetail {
        license: license.into(),
        statistics,
        recent_activity: recent_activity.into_iter().map(Into::into).collect(),
        devices: devices.into_iter().map(Into::into).collect(),
    }))
}

pub async fn suspicious_activity(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let flagged = queries::suspicious_activity(&conn)?;

    Ok(Json(json!({
        "total": flagged.len(),
        "suspicious_licenses": flagged,
    })))
}

pub async fn activity_summary(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let summary = queries::activity_summary(&conn)?;

    Ok(Json(json!({
        "summary": summary,
        "timestamp": Utc::now().timestamp(),
    })))
}

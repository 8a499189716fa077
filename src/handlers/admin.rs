use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, JsonOrForm};
use crate::keys;
use crate::models::{ExpiryRepr, License, Plan};
use crate::scheduler;

/// Keys carry ~20 alphanumeric characters of entropy; more than a couple
/// of collisions in a row means something is broken, not unlucky.
const KEY_GENERATION_ATTEMPTS: usize = 10;

/// Public fields of a license, as returned by create/list/detail.
#[derive(Debug, Serialize)]
pub struct LicenseView {
    pub key: String,
    pub plan: Plan,
    pub owner: String,
    pub hw_id: String,
    pub created_at: i64,
    pub expires_at: ExpiryRepr,
    pub revoked: bool,
    pub last_seen: Option<i64>,
    pub first_activation: Option<i64>,
    pub activations: i64,
    pub device_info: String,
    pub ip_address: String,
}

impl From<License> for LicenseView {
    fn from(license: License) -> Self {
        LicenseView {
            key: license.key,
            plan: license.plan,
            owner: license.owner,
            hw_id: license.hw_id,
            created_at: license.created_at,
            expires_at: license.expires_at.into(),
            revoked: license.revoked,
            last_seen: license.last_seen,
            first_activation: license.first_activation,
            activations: license.activations,
            device_info: license.device_info,
            ip_address: license.ip_address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub plan: Plan,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub key: String,
    #[serde(default = "default_extend_days")]
    pub days: i64,
}

fn default_extend_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub key: String,
    #[serde(default)]
    pub owner: String,
    pub plan: Plan,
}

fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

pub async fn create_license(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<CreateRequest>,
) -> Result<(StatusCode, Json<LicenseView>)> {
    let conn = state.db.get()?;
    let expires_at = req.plan.expiry_from(Utc::now().timestamp());

    let mut created = None;
    for _ in 0..KEY_GENERATION_ATTEMPTS {
        let key = keys::generate_key(&state.license_prefix);
        match queries::insert_license(&conn, &key, req.plan, &req.owner, expires_at) {
            Ok(license) => {
                created = Some(license);
                break;
            }
            Err(AppError::Conflict(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    let license = created
        .ok_or_else(|| AppError::Internal("could not generate a unique license key".into()))?;
    tracing::info!(key = %license.key, plan = %license.plan, "license created");

    Ok((StatusCode::CREATED, Json(license.into())))
}

pub async fn revoke_license(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<KeyRequest>,
) -> Result<Json<serde_json::Value>> {
    let key = normalize_key(&req.key);
    let conn = state.db.get()?;

    if !queries::set_revoked(&conn, &key, true)? {
        return Err(AppError::NotFound(format!("license {}", key)));
    }
    tracing::info!(key = %key, "license revoked");

    Ok(Json(json!({ "revoked": key })))
}

pub async fn reactivate_license(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<KeyRequest>,
) -> Result<Json<serde_json::Value>> {
    let key = normalize_key(&req.key);
    let conn = state.db.get()?;

    if !queries::set_revoked(&conn, &key, false)? {
        return Err(AppError::NotFound(format!("license {}", key)));
    }
    tracing::info!(key = %key, "license reactivated");

    Ok(Json(json!({ "reactivated": key })))
}

/// Two-phase unlock: revoke + unbind now, deferred conditional
/// reactivation later. The delay exceeds the client poll interval so a
/// running client sees the revocation and drops its cached key before the
/// license frees up.
pub async fn reset_device(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<KeyRequest>,
) -> Result<Json<serde_json::Value>> {
    let key = normalize_key(&req.key);
    let mut conn = state.db.get()?;

    let Some((license_id, run_at)) =
        queries::reset_device(&mut conn, &key, state.reactivation_delay_secs)?
    else {
        return Err(AppError::NotFound(format!("license {}", key)));
    };

    scheduler::spawn_reactivation(state.clone(), license_id, run_at);
    tracing::info!(key = %key, run_at, "device reset, unlock scheduled");

    Ok(Json(json!({ "reset": key, "unlocks_at": run_at })))
}

pub async fn extend_license(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<ExtendRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.days <= 0 {
        return Err(AppError::BadRequest("days must be positive".into()));
    }

    let key = normalize_key(&req.key);
    let mut conn = state.db.get()?;

    let Some(license) = queries::extend_license(&mut conn, &key, req.days)? else {
        return Err(AppError::NotFound(format!("license {}", key)));
    };

    Ok(Json(json!({
        "extended_until": ExpiryRepr::from(license.expires_at),
    })))
}

pub async fn edit_license(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<EditRequest>,
) -> Result<Json<serde_json::Value>> {
    let key = normalize_key(&req.key);
    let mut conn = state.db.get()?;

    let Some(license) = queries::edit_license(&mut conn, &key, &req.owner, req.plan)? else {
        return Err(AppError::NotFound(format!("license {}", key)));
    };

    Ok(Json(json!({
        "updated": license.key,
        "owner": license.owner,
        "plan": license.plan,
        "expires_at": ExpiryRepr::from(license.expires_at),
    })))
}

pub async fn delete_license(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<KeyRequest>,
) -> Result<Json<serde_json::Value>> {
    let key = normalize_key(&req.key);
    let conn = state.db.get()?;

    // Audit and device rows cascade with the license.
    if !queries::delete_license(&conn, &key)? {
        return Err(AppError::NotFound(format!("license {}", key)));
    }
    tracing::info!(key = %key, "license deleted");

    Ok(Json(json!({ "deleted": key })))
}

pub async fn list_licenses(State(state): State<AppState>) -> Result<Json<Vec<LicenseView>>> {
    let conn = state.db.get()?;
    let licenses = queries::list_licenses(&conn)?;
    Ok(Json(licenses.into_iter().map(Into::into).collect()))
}

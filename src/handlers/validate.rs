use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{ExpiryRepr, Plan, ValidationAttempt, ValidationOutcome, ValidationStatus};
use crate::util;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub key: String,
    pub hw_id: String,
    #[serde(default)]
    pub app_version: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub plan: Plan,
    pub owner: String,
    pub expires_at: ExpiryRepr,
}

#[derive(Serialize)]
struct RejectionBody {
    error: &'static str,
}

/// WRONG_DEVICE means "right key, wrong machine" and gets its own status
/// code; the other rejections all tell the caller to stop trying.
fn rejection(status: ValidationStatus) -> Response {
    let code = match status {
        ValidationStatus::WrongDevice => StatusCode::CONFLICT,
        _ => StatusCode::FORBIDDEN,
    };
    (code, Json(RejectionBody { error: status.as_str() })).into_response()
}

/// The endpoint clients poll every ~60s.
pub async fn validate_license(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ValidateRequest>,
) -> Result<Response> {
    let key = req.key.trim().to_uppercase();
    let hw_id = req.hw_id.trim().to_string();

    // Without both a key and a device id there is nothing to attribute an
    // audit row to; reject before touching the store.
    if key.is_empty() || hw_id.is_empty() {
        return Ok(rejection(ValidationStatus::Invalid));
    }

    let ip = util::client_ip(&headers, peer);
    let device_info = util::device_info(&headers);
    let user_agent = util::user_agent(&headers);

    let attempt = ValidationAttempt {
        key: &key,
        hw_id: &hw_id,
        ip: &ip,
        device_info: &device_info,
        user_agent: &user_agent,
        app_version: &req.app_version,
    };

    let mut conn = state.db.get()?;
    match queries::validate_license(&mut conn, &attempt)? {
        ValidationOutcome::Granted(license) => Ok(Json(ValidateResponse {
            valid: true,
            plan: license.plan,
            owner: license.owner,
            expires_at: license.expires_at.into(),
        })
        .into_response()),
        ValidationOutcome::Rejected(status) => Ok(rejection(status)),
    }
}

pub mod admin;
pub mod analytics;
pub mod validate;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;
use crate::middleware::admin_auth;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Client-facing endpoints, no auth.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/validate", post(validate::validate_license))
}

/// Admin endpoints; every route passes the credential check before any
/// store access.
pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/create", post(admin::create_license))
        .route("/api/admin/revoke", post(admin::revoke_license))
        .route("/api/admin/reactivate", post(admin::reactivate_license))
        .route("/api/admin/reset_device", post(admin::reset_device))
        .route("/api/admin/extend", post(admin::extend_license))
        .route("/api/admin/edit", post(admin::edit_license))
        .route("/api/admin/delete", post(admin::delete_license))
        .route("/api/admin/list", get(admin::list_licenses))
        .route("/api/admin/licenses/{key}", get(analytics::license_detail))
        .route("/api/admin/suspicious", get(analytics::suspicious_activity))
        .route("/api/admin/summary", get(analytics::activity_summary))
        .route_layer(axum_middleware::from_fn_with_state(state, admin_auth))
}

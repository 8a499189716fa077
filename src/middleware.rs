//! Admin credential check.
//!
//! Every admin route runs through [`admin_auth`] before any store access.
//! The secret arrives either in the `X-Admin-Secret` header or as a
//! `?secret=` query parameter (the latter kept for form posts from simple
//! tooling). Comparison is constant-time.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::AppError;

pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = secret_from_request(request.headers(), request.uri().query());

    let authorized = match provided {
        Some(secret) if !state.admin_secret.is_empty() => {
            bool::from(secret.as_bytes().ct_eq(state.admin_secret.as_bytes()))
        }
        _ => false,
    };

    if !authorized {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn secret_from_request(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(secret) = headers.get("x-admin-secret").and_then(|v| v.to_str().ok()) {
        return Some(secret.to_string());
    }
    // The query value arrives percent-encoded; decode it so secrets with
    // reserved characters match the same way they do via the header.
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "secret")
                .map(|(_, v)| v.to_string())
        })
        .filter(|s| !s.is_empty())
}

//! End-to-end HTTP tests driven through the router with `tower::oneshot`.

#[path = "common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-admin-secret", TEST_ADMIN_SECRET)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn admin_routes_reject_missing_and_wrong_secrets() {
    let state = create_test_app_state();

    let response = test_app(state.clone())
        .oneshot(Request::get("/api/admin/list").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test_app(state)
        .oneshot(
            Request::get("/api/admin/list")
                .header("x-admin-secret", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_secret_is_accepted_as_query_parameter() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(
            Request::get(format!("/api/admin/list?secret={}", TEST_ADMIN_SECRET))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_returns_a_fresh_license() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/create",
            json!({"plan": "yearly", "owner": "Alice"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let key = body["key"].as_str().unwrap();
    assert!(key.starts_with("VB-"));
    assert_eq!(body["plan"], "yearly");
    assert_eq!(body["owner"], "Alice");
    assert_eq!(body["hw_id"], "");
    assert_eq!(body["revoked"], false);
    assert!(body["expires_at"].is_i64());
}

#[tokio::test]
async fn create_accepts_form_encoded_bodies() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(
            Request::post("/api/admin/create")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header("x-admin-secret", TEST_ADMIN_SECRET)
                .body(Body::from("plan=lifetime&owner=Formy"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["plan"], "lifetime");
    assert_eq!(body["expires_at"], "lifetime");
}

#[tokio::test]
async fn validate_round_trip_binds_then_guards() {
    let state = create_test_app_state();

    let created = test_app(state.clone())
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/create",
            json!({"plan": "monthly", "owner": "Bob"}),
        ))
        .await
        .unwrap();
    let key = body_json(created).await["key"].as_str().unwrap().to_string();

    // First device binds.
    let response = test_app(state.clone())
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": key, "hw_id": "device-1", "app_version": "2.1.0"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["owner"], "Bob");
    assert_eq!(body["plan"], "monthly");

    // Second device is turned away with its own status code.
    let response = test_app(state)
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": key, "hw_id": "device-2"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "WRONG_DEVICE");
}

#[tokio::test]
async fn validate_rejects_unknown_and_malformed_keys() {
    let state = create_test_app_state();

    let response = test_app(state.clone())
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": "VB-0000-0000-0000-0000", "hw_id": "d"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "INVALID");

    // Blank fields never reach the store.
    let response = test_app(state.clone())
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": "  ", "hw_id": "d"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let conn = state.db.get().unwrap();
    // Only the unknown-key attempt was audited.
    assert_eq!(count_audit_rows(&conn), 1);
}

#[tokio::test]
async fn validate_normalizes_key_case_and_whitespace() {
    let state = create_test_app_state();

    let created = test_app(state.clone())
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/create",
            json!({"plan": "monthly", "owner": "Case"}),
        ))
        .await
        .unwrap();
    let key = body_json(created).await["key"].as_str().unwrap().to_string();

    let sloppy = format!("  {}  ", key.to_lowercase());
    let response = test_app(state)
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": sloppy, "hw_id": "device-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn revoke_then_validate_is_forbidden() {
    let state = create_test_app_state();

    let created = test_app(state.clone())
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/create",
            json!({"plan": "monthly", "owner": "Eve"}),
        ))
        .await
        .unwrap();
    let key = body_json(created).await["key"].as_str().unwrap().to_string();

    let response = test_app(state.clone())
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/revoke",
            json!({"key": key}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = test_app(state)
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": key, "hw_id": "device-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "REVOKED");
}

#[tokio::test]
async fn admin_ops_on_unknown_keys_return_not_found() {
    let state = create_test_app_state();

    for uri in ["/api/admin/revoke", "/api/admin/extend", "/api/admin/delete"] {
        let response = test_app(state.clone())
            .oneshot(admin_json_request(
                "POST",
                uri,
                json!({"key": "VB-GONE-GONE-GONE-0000"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn license_detail_includes_stats_activity_and_devices() {
    let state = create_test_app_state();

    let created = test_app(state.clone())
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/create",
            json!({"plan": "monthly", "owner": "Detail"}),
        ))
        .await
        .unwrap();
    let key = body_json(created).await["key"].as_str().unwrap().to_string();

    let response = test_app(state.clone())
        .oneshot(json_request(
            "POST",
            "/api/validate",
            json!({"key": key, "hw_id": "device-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = test_app(state)
        .oneshot(
            Request::get(format!("/api/admin/licenses/{}", key))
                .header("x-admin-secret", TEST_ADMIN_SECRET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["license"]["key"], key.as_str());
    assert_eq!(body["statistics"]["total_attempts"], 1);
    assert_eq!(body["statistics"]["successful"], 1);
    assert_eq!(body["recent_activity"].as_array().unwrap().len(), 1);
    assert_eq!(body["devices"].as_array().unwrap().len(), 1);
    assert_eq!(body["devices"][0]["hw_id"], "device-1");
}

#[tokio::test]
async fn unknown_plan_is_a_bad_request() {
    let state = create_test_app_state();

    let response = test_app(state.clone())
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/create",
            json!({"plan": "weekly", "owner": "Nobody"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was created, and the same check guards edits.
    let conn = state.db.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
    drop(conn);

    let response = test_app(state)
        .oneshot(admin_json_request(
            "POST",
            "/api/admin/edit",
            json!({"key": "VB-AAAA-BBBB-CCCC-DDDD", "plan": "forever"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(
            Request::post("/api/validate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

//! Test utilities and fixtures for Vaultbind integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use vaultbind::db::{init_db, queries, AppState};
pub use vaultbind::keys;
pub use vaultbind::models::*;

pub const TEST_ADMIN_SECRET: &str = "test-admin-secret";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Path for a file-backed test database, for tests that need connections
/// from multiple threads (in-memory DBs are per-connection).
pub fn test_db_path(tag: &str) -> String {
    format!(
        "{}/vaultbind_test_{}_{}.db",
        std::env::temp_dir().display(),
        tag,
        uuid::Uuid::new_v4()
    )
}

/// Unix timestamp `days` in the future
pub fn future_timestamp(days: i64) -> i64 {
    chrono::Utc::now().timestamp() + days * SECONDS_PER_DAY
}

/// Unix timestamp `days` in the past
pub fn past_timestamp(days: i64) -> i64 {
    chrono::Utc::now().timestamp() - days * SECONDS_PER_DAY
}

/// Create a test license with an expiry derived from its plan
pub fn create_test_license(conn: &Connection, plan: Plan, owner: &str) -> License {
    let key = keys::generate_key("VB");
    let expires_at = plan.expiry_from(chrono::Utc::now().timestamp());
    queries::insert_license(conn, &key, plan, owner, expires_at)
        .expect("Failed to create test license")
}

/// Create a test license with an explicit expiry
pub fn create_test_license_with_expiry(
    conn: &Connection,
    plan: Plan,
    owner: &str,
    expires_at: Option<i64>,
) -> License {
    let key = keys::generate_key("VB");
    queries::insert_license(conn, &key, plan, owner, expires_at)
        .expect("Failed to create test license")
}

/// Run one validation attempt with fixed device metadata
pub fn validate(
    conn: &mut Connection,
    key: &str,
    hw_id: &str,
    ip: &str,
) -> ValidationOutcome {
    let attempt = ValidationAttempt {
        key,
        hw_id,
        ip,
        device_info: "Test OS - Test Client",
        user_agent: "vaultbind-tests/1.0",
        app_version: "1.0.0",
    };
    queries::validate_license(conn, &attempt).expect("validation call failed")
}

pub fn assert_granted(outcome: &ValidationOutcome) -> &License {
    match outcome {
        ValidationOutcome::Granted(license) => license,
        ValidationOutcome::Rejected(status) => {
            panic!("expected grant, got rejection {:?}", status)
        }
    }
}

pub fn assert_rejected(outcome: &ValidationOutcome, expected: ValidationStatus) {
    match outcome {
        ValidationOutcome::Granted(license) => {
            panic!("expected {:?}, got grant for {}", expected, license.key)
        }
        ValidationOutcome::Rejected(status) => assert_eq!(*status, expected),
    }
}

/// Total audit rows in the database
pub fn count_audit_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM activity_logs", [], |row| row.get(0))
        .expect("count failed")
}

/// Audit rows attributed to the sentinel (nonexistent license)
pub fn count_sentinel_audit_rows(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM activity_logs WHERE license_id IS NULL",
        [],
        |row| row.get(0),
    )
    .expect("count failed")
}

/// AppState backed by a single-connection in-memory pool.
/// max_size 1 so every pooled checkout sees the same database.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        admin_secret: TEST_ADMIN_SECRET.to_string(),
        license_prefix: "VB".to_string(),
        reactivation_delay_secs: 65,
    }
}

/// AppState backed by a file database, for scheduler tests that need the
/// spawned task to open its own connection.
pub fn create_file_app_state(db_path: &str, reactivation_delay_secs: i64) -> AppState {
    let pool = vaultbind::db::create_pool(db_path).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        admin_secret: TEST_ADMIN_SECRET.to_string(),
        license_prefix: "VB".to_string(),
        reactivation_delay_secs,
    }
}

/// Full router (public + admin) with a mocked peer address so ConnectInfo
/// resolves in oneshot tests
pub fn test_app(state: AppState) -> Router {
    use axum::extract::connect_info::MockConnectInfo;
    use std::net::SocketAddr;

    Router::new()
        .merge(vaultbind::handlers::public_router())
        .merge(vaultbind::handlers::admin_router(state.clone()))
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))))
        .with_state(state)
}

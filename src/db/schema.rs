use rusqlite::Connection;

/// Initialize the database schema.
///
/// One parent table (licenses) and three children: the append-only audit
/// log, per-device usage history, and the durable queue of deferred
/// reactivations. Children cascade-delete with their license.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            plan TEXT NOT NULL CHECK (plan IN ('monthly', 'yearly', 'lifetime')),
            owner TEXT NOT NULL DEFAULT '',
            hw_id TEXT NOT NULL DEFAULT '',          -- empty until first activation
            created_at INTEGER NOT NULL,
            expires_at INTEGER,                      -- NULL = lifetime
            revoked INTEGER NOT NULL DEFAULT 0,
            last_seen INTEGER,
            activations INTEGER NOT NULL DEFAULT 0,
            first_activation INTEGER,
            device_info TEXT NOT NULL DEFAULT '',
            ip_address TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_created ON licenses(created_at DESC);

        -- Append-only: one row per validation attempt, including attempts
        -- against keys that do not exist (license_id NULL, key retained).
        CREATE TABLE IF NOT EXISTS activity_logs (
            id TEXT PRIMARY KEY,
            license_id TEXT REFERENCES licenses(id) ON DELETE CASCADE,
            license_key TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            hw_id TEXT NOT NULL DEFAULT '',
            ip_address TEXT NOT NULL DEFAULT '',
            device_info TEXT NOT NULL DEFAULT '',
            user_agent TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL CHECK (status IN ('SUCCESS', 'INVALID', 'REVOKED', 'EXPIRED', 'WRONG_DEVICE')),
            error_detail TEXT NOT NULL DEFAULT '',
            app_version TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_activity_logs_license ON activity_logs(license_id);
        CREATE INDEX IF NOT EXISTS idx_activity_logs_timestamp ON activity_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_activity_logs_license_time ON activity_logs(license_id, timestamp DESC);

        -- One row per distinct (license, device) pair ever seen.
        CREATE TABLE IF NOT EXISTS device_history (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            hw_id TEXT NOT NULL,
            device_info TEXT NOT NULL DEFAULT '',
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL,
            ip_addresses TEXT NOT NULL DEFAULT '[]', -- JSON array, insertion-ordered, deduplicated
            total_uses INTEGER NOT NULL DEFAULT 1,
            is_current INTEGER NOT NULL DEFAULT 0,   -- at most one per license
            UNIQUE(license_id, hw_id)
        );
        CREATE INDEX IF NOT EXISTS idx_device_history_license ON device_history(license_id, last_seen DESC);

        -- Durable queue for the two-phase device-reset unlock. Survives
        -- restarts; re-armed at boot.
        CREATE TABLE IF NOT EXISTS scheduled_reactivations (
            license_id TEXT PRIMARY KEY REFERENCES licenses(id) ON DELETE CASCADE,
            run_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

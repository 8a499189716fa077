use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    ActivityLog, ActivitySummary, DeviceHistory, License, LicenseStats, Plan, SuspiciousLicense,
    ValidationAttempt, ValidationOutcome, ValidationStatus, SECONDS_PER_DAY,
};

use super::from_row::{query_all, query_one, ACTIVITY_LOG_COLS, DEVICE_HISTORY_COLS, LICENSE_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ License Store ============

/// Insert a new license. Fails with `Conflict` if the key already exists;
/// the caller regenerates and retries.
pub fn insert_license(
    conn: &Connection,
    key: &str,
    plan: Plan,
    owner: &str,
    expires_at: Option<i64>,
) -> Result<License> {
    let id = gen_id();
    let created_at = now();

    let inserted = conn.execute(
        "INSERT INTO licenses (id, key, plan, owner, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, key, plan.as_str(), owner, created_at, expires_at],
    );

    match inserted {
        Ok(_) => Ok(License {
            id,
            key: key.to_string(),
            plan,
            owner: owner.to_string(),
            hw_id: String::new(),
            created_at,
            expires_at,
            revoked: false,
            last_seen: None,
            activations: 0,
            first_activation: None,
            device_info: String::new(),
            ip_address: String::new(),
        }),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(AppError::Conflict(format!("license key {} already exists", key)))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_license_by_key(conn: &Connection, key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        &[&key],
    )
}

pub fn list_licenses(conn: &Connection) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!("SELECT {} FROM licenses ORDER BY created_at DESC", LICENSE_COLS),
        &[],
    )
}

/// Flip the revoked flag. Idempotent; returns false only when the key is
/// unknown.
pub fn set_revoked(conn: &Connection, key: &str, revoked: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET revoked = ?1 WHERE key = ?2",
        params![revoked, key],
    )?;
    Ok(affected > 0)
}

/// Phase one of the device reset: revoke and unbind in one transaction,
/// and enqueue the deferred unlock. Returns the license id and the unlock
/// instant, or None if the key is unknown.
pub fn reset_device(
    conn: &mut Connection,
    key: &str,
    delay_secs: i64,
) -> Result<Option<(String, i64)>> {
    let run_at = now() + delay_secs;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license: Option<License> = query_one(
        &tx,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        &[&key],
    )?;
    let Some(license) = license else {
        return Ok(None);
    };

    tx.execute(
        "UPDATE licenses SET revoked = 1, hw_id = '' WHERE id = ?1",
        params![license.id],
    )?;
    // A second reset before the first fires just pushes the unlock out.
    tx.execute(
        "INSERT INTO scheduled_reactivations (license_id, run_at) VALUES (?1, ?2)
         ON CONFLICT(license_id) DO UPDATE SET run_at = excluded.run_at",
        params![license.id, run_at],
    )?;
    tx.commit()?;

    Ok(Some((license.id, run_at)))
}

/// Phase two of the device reset, run by the scheduler at wake time.
/// Unlocks only if the license is still revoked and still unbound; any
/// admin or client action in between supersedes the reset. The queue row
/// is consumed either way. Returns whether the license was unlocked.
pub fn complete_scheduled_reactivation(conn: &mut Connection, license_id: &str) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license: Option<License> = query_one(
        &tx,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&license_id],
    )?;

    let unlocked = match license {
        Some(l) if l.revoked && l.hw_id.is_empty() => {
            tx.execute(
                "UPDATE licenses SET revoked = 0 WHERE id = ?1",
                params![license_id],
            )?;
            true
        }
        _ => false,
    };

    tx.execute(
        "DELETE FROM scheduled_reactivations WHERE license_id = ?1",
        params![license_id],
    )?;
    tx.commit()?;

    Ok(unlocked)
}

/// All queued reactivations, for re-arming at startup.
pub fn pending_reactivations(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt =
        conn.prepare("SELECT license_id, run_at FROM scheduled_reactivations ORDER BY run_at")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extend the expiry by `days` from whichever is later, the current expiry
/// or now. A still-lifetime license stays lifetime; only an explicit
/// re-plan moves it off. Returns the updated license, or None if unknown.
pub fn extend_license(conn: &mut Connection, key: &str, days: i64) -> Result<Option<License>> {
    let now = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license: Option<License> = query_one(
        &tx,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        &[&key],
    )?;
    let Some(mut license) = license else {
        return Ok(None);
    };

    if let Some(expires_at) = license.expires_at {
        // days is admin-supplied; the arithmetic must not wrap the expiry
        // into the past.
        let new_expiry = days
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|secs| expires_at.max(now).checked_add(secs))
            .ok_or_else(|| {
                AppError::BadRequest(format!("extension of {} days overflows the expiry", days))
            })?;
        tx.execute(
            "UPDATE licenses SET expires_at = ?1 WHERE id = ?2",
            params![new_expiry, license.id],
        )?;
        license.expires_at = Some(new_expiry);
    }
    tx.commit()?;

    Ok(Some(license))
}

/// Update owner and plan. A real plan change on a non-expired license
/// recomputes expiry from the new plan starting now; remaining time on the
/// old plan is not prorated.
pub fn edit_license(
    conn: &mut Connection,
    key: &str,
    owner: &str,
    plan: Plan,
) -> Result<Option<License>> {
    let now = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license: Option<License> = query_one(
        &tx,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        &[&key],
    )?;
    let Some(mut license) = license else {
        return Ok(None);
    };

    license.owner = owner.to_string();
    if license.plan != plan {
        license.plan = plan;
        let already_expired = license.expires_at.is_some_and(|exp| exp <= now);
        if !already_expired {
            license.expires_at = plan.expiry_from(now);
        }
    }

    tx.execute(
        "UPDATE licenses SET owner = ?1, plan = ?2, expires_at = ?3 WHERE id = ?4",
        params![license.owner, license.plan.as_str(), license.expires_at, license.id],
    )?;
    tx.commit()?;

    Ok(Some(license))
}

/// Delete a license; audit and device rows cascade with it.
pub fn delete_license(conn: &Connection, key: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM licenses WHERE key = ?1", params![key])?;
    Ok(affected > 0)
}

// ============ Activity Recorder ============

/// Append one audit row and upsert the matching device-history row.
///
/// Called exactly once per validation attempt, inside the same transaction
/// as whatever license mutation the attempt performs. `license` is None for
/// attempts against keys that do not exist; those get an audit row only.
fn record_attempt(
    conn: &Connection,
    license: Option<&License>,
    attempt: &ValidationAttempt,
    status: ValidationStatus,
    detail: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_logs (id, license_id, license_key, timestamp, hw_id, ip_address,
                                    device_info, user_agent, status, error_detail, app_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            gen_id(),
            license.map(|l| l.id.as_str()),
            attempt.key,
            now,
            attempt.hw_id,
            attempt.ip,
            attempt.device_info,
            attempt.user_agent,
            status.as_str(),
            detail,
            attempt.app_version,
        ],
    )?;

    let Some(license) = license else {
        return Ok(());
    };
    if attempt.hw_id.is_empty() {
        return Ok(());
    }

    let existing: Option<DeviceHistory> = query_one(
        conn,
        &format!(
            "SELECT {} FROM device_history WHERE license_id = ?1 AND hw_id = ?2",
            DEVICE_HISTORY_COLS
        ),
        &[&license.id, &attempt.hw_id],
    )?;

    match existing {
        Some(device) => {
            let mut ips = device.ip_addresses;
            if !attempt.ip.is_empty() && !ips.iter().any(|ip| ip == attempt.ip) {
                ips.push(attempt.ip.to_string());
            }
            let ip_json = serde_json::to_string(&ips)
                .map_err(|e| AppError::Internal(format!("ip list serialization: {}", e)))?;
            conn.execute(
                "UPDATE device_history
                 SET last_seen = ?1, total_uses = total_uses + 1, ip_addresses = ?2
                 WHERE id = ?3",
                params![now, ip_json, device.id],
            )?;
        }
        None => {
            let ips: Vec<&str> = if attempt.ip.is_empty() {
                Vec::new()
            } else {
                vec![attempt.ip]
            };
            let ip_json = serde_json::to_string(&ips)
                .map_err(|e| AppError::Internal(format!("ip list serialization: {}", e)))?;
            conn.execute(
                "INSERT INTO device_history (id, license_id, hw_id, device_info, first_seen,
                                             last_seen, ip_addresses, total_uses, is_current)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
                params![
                    gen_id(),
                    license.id,
                    attempt.hw_id,
                    attempt.device_info,
                    now,
                    now,
                    ip_json,
                    status == ValidationStatus::Success,
                ],
            )?;
        }
    }

    Ok(())
}

// ============ Validation Engine ============

/// Run the validation state machine for one attempt.
///
/// The whole call is a single IMMEDIATE transaction: the audit row, the
/// device-history upsert, and any license mutation commit together or not
/// at all. IMMEDIATE acquires the write lock up front, so concurrent
/// validations for the same key serialize; at most one caller can win the
/// first-activation bind and later callers are evaluated against the
/// now-populated hw_id.
pub fn validate_license(
    conn: &mut Connection,
    attempt: &ValidationAttempt,
) -> Result<ValidationOutcome> {
    let now = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license: Option<License> = query_one(
        &tx,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        &[&attempt.key],
    )?;
    let Some(mut license) = license else {
        record_attempt(&tx, None, attempt, ValidationStatus::Invalid, "key does not exist", now)?;
        tx.commit()?;
        return Ok(ValidationOutcome::Rejected(ValidationStatus::Invalid));
    };

    if license.revoked {
        record_attempt(
            &tx,
            Some(&license),
            attempt,
            ValidationStatus::Revoked,
            "license revoked",
            now,
        )?;
        tx.commit()?;
        return Ok(ValidationOutcome::Rejected(ValidationStatus::Revoked));
    }

    if let Some(expires_at) = license.expires_at {
        if now > expires_at {
            record_attempt(
                &tx,
                Some(&license),
                attempt,
                ValidationStatus::Expired,
                "license expired",
                now,
            )?;
            tx.commit()?;
            return Ok(ValidationOutcome::Rejected(ValidationStatus::Expired));
        }
    }

    if license.hw_id.is_empty() {
        // First activation: bind this device. The hw_id guard is the CAS;
        // zero rows affected means another caller bound first.
        let bound = tx.execute(
            "UPDATE licenses
             SET hw_id = ?1, first_activation = ?2, device_info = ?3, ip_address = ?4
             WHERE id = ?5 AND hw_id = ''",
            params![attempt.hw_id, now, attempt.device_info, attempt.ip, license.id],
        )?;
        if bound == 1 {
            license.hw_id = attempt.hw_id.to_string();
            license.first_activation = Some(now);
            license.device_info = attempt.device_info.to_string();
        } else {
            let reread: Option<License> = query_one(
                &tx,
                &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
                &[&license.id],
            )?;
            license = reread
                .ok_or_else(|| AppError::Internal("license vanished mid-validation".into()))?;
        }
    }

    if license.hw_id != attempt.hw_id {
        record_attempt(
            &tx,
            Some(&license),
            attempt,
            ValidationStatus::WrongDevice,
            "attempt from an unauthorized device",
            now,
        )?;
        tx.commit()?;
        return Ok(ValidationOutcome::Rejected(ValidationStatus::WrongDevice));
    }

    tx.execute(
        "UPDATE licenses SET last_seen = ?1, activations = activations + 1, ip_address = ?2
         WHERE id = ?3",
        params![now, attempt.ip, license.id],
    )?;
    license.last_seen = Some(now);
    license.activations += 1;
    license.ip_address = attempt.ip.to_string();

    record_attempt(&tx, Some(&license), attempt, ValidationStatus::Success, "", now)?;

    // Exactly one current device per license: clear the flag everywhere
    // else before setting it on the matching row.
    tx.execute(
        "UPDATE device_history SET is_current = 0 WHERE license_id = ?1 AND hw_id <> ?2",
        params![license.id, attempt.hw_id],
    )?;
    tx.execute(
        "UPDATE device_history SET is_current = 1 WHERE license_id = ?1 AND hw_id = ?2",
        params![license.id, attempt.hw_id],
    )?;

    tx.commit()?;
    Ok(ValidationOutcome::Granted(license))
}

// ============ Derived Views ============

pub fn recent_activity(
    conn: &Connection,
    license_id: &str,
    limit: i64,
) -> Result<Vec<ActivityLog>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM activity_logs WHERE license_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
            ACTIVITY_LOG_COLS
        ),
        &[&license_id, &limit],
    )
}

pub fn devices_for_license(conn: &Connection, license_id: &str) -> Result<Vec<DeviceHistory>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM device_history WHERE license_id = ?1 ORDER BY last_seen DESC",
            DEVICE_HISTORY_COLS
        ),
        &[&license_id],
    )
}

pub fn license_stats(conn: &Connection, license_id: &str) -> Result<LicenseStats> {
    let total_attempts: i64 = conn.query_row(
        "SELECT COUNT(*) FROM activity_logs WHERE license_id = ?1",
        params![license_id],
        |row| row.get(0),
    )?;
    let successful: i64 = conn.query_row(
        "SELECT COUNT(*) FROM activity_logs WHERE license_id = ?1 AND status = 'SUCCESS'",
        params![license_id],
        |row| row.get(0),
    )?;
    let unique_ips: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT ip_address) FROM activity_logs
         WHERE license_id = ?1 AND ip_address <> ''",
        params![license_id],
        |row| row.get(0),
    )?;
    let unique_devices: i64 = conn.query_row(
        "SELECT COUNT(*) FROM device_history WHERE license_id = ?1",
        params![license_id],
        |row| row.get(0),
    )?;

    Ok(LicenseStats {
        total_attempts,
        successful,
        failed: total_attempts - successful,
        unique_ips,
        unique_devices,
    })
}

/// Heuristic scan over all licenses. A license can be flagged more than
/// once, at different severities.
pub fn suspicious_activity(conn: &Connection) -> Result<Vec<SuspiciousLicense>> {
    let day_ago = now() - SECONDS_PER_DAY;
    let mut flagged = Vec::new();

    for license in list_licenses(conn)? {
        let devices = devices_for_license(conn, &license.id)?;
        let device_count = devices.len() as i64;

        if device_count > 2 {
            flagged.push(SuspiciousLicense {
                key: license.key.clone(),
                owner: license.owner.clone(),
                reason: format!("{} distinct devices seen", device_count),
                devices: device_count,
                severity: "HIGH",
            });
        }

        let recent_fails: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity_logs
             WHERE license_id = ?1 AND status <> 'SUCCESS' AND timestamp > ?2",
            params![license.id, day_ago],
            |row| row.get(0),
        )?;
        if recent_fails > 5 {
            flagged.push(SuspiciousLicense {
                key: license.key.clone(),
                owner: license.owner.clone(),
                reason: format!("{} failed attempts in the last 24h", recent_fails),
                devices: device_count,
                severity: "MEDIUM",
            });
        }

        let unique_ips: HashSet<&str> = devices
            .iter()
            .flat_map(|d| d.ip_addresses.iter())
            .map(String::as_str)
            .collect();
        if unique_ips.len() > 5 {
            flagged.push(SuspiciousLicense {
                key: license.key.clone(),
                owner: license.owner.clone(),
                reason: format!("{} distinct IPs across device history", unique_ips.len()),
                devices: device_count,
                severity: "LOW",
            });
        }
    }

    Ok(flagged)
}

pub fn activity_summary(conn: &Connection) -> Result<ActivitySummary> {
    let now = now();
    let last_24h = now - SECONDS_PER_DAY;
    let last_7d = now - 7 * SECONDS_PER_DAY;

    let total_licenses: i64 =
        conn.query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))?;
    let active_last_24h: i64 = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE last_seen >= ?1",
        params![last_24h],
        |row| row.get(0),
    )?;
    let active_last_7d: i64 = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE last_seen >= ?1",
        params![last_7d],
        |row| row.get(0),
    )?;
    let inactive_7d: i64 = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE last_seen < ?1 OR last_seen IS NULL",
        params![last_7d],
        |row| row.get(0),
    )?;
    let validation_attempts_24h: i64 = conn.query_row(
        "SELECT COUNT(*) FROM activity_logs WHERE timestamp >= ?1",
        params![last_24h],
        |row| row.get(0),
    )?;
    let successful_24h: i64 = conn.query_row(
        "SELECT COUNT(*) FROM activity_logs WHERE timestamp >= ?1 AND status = 'SUCCESS'",
        params![last_24h],
        |row| row.get(0),
    )?;

    Ok(ActivitySummary {
        total_licenses,
        active_last_24h,
        active_last_7d,
        inactive_7d,
        validation_attempts_24h,
        successful_24h,
        failed_24h: validation_attempts_24h - successful_24h,
    })
}

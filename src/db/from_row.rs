//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::{ActivityLog, DeviceHistory, License};

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const LICENSE_COLS: &str = "id, key, plan, owner, hw_id, created_at, expires_at, revoked, \
     last_seen, activations, first_activation, device_info, ip_address";

pub const ACTIVITY_LOG_COLS: &str = "id, license_id, license_key, timestamp, hw_id, ip_address, \
     device_info, user_agent, status, error_detail, app_version";

pub const DEVICE_HISTORY_COLS: &str = "id, license_id, hw_id, device_info, first_seen, last_seen, \
     ip_addresses, total_uses, is_current";

// ============ FromRow Implementations ============

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            key: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            owner: row.get(3)?,
            hw_id: row.get(4)?,
            created_at: row.get(5)?,
            expires_at: row.get(6)?,
            revoked: row.get(7)?,
            last_seen: row.get(8)?,
            activations: row.get(9)?,
            first_activation: row.get(10)?,
            device_info: row.get(11)?,
            ip_address: row.get(12)?,
        })
    }
}

impl FromRow for ActivityLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ActivityLog {
            id: row.get(0)?,
            license_id: row.get(1)?,
            license_key: row.get(2)?,
            timestamp: row.get(3)?,
            hw_id: row.get(4)?,
            ip_address: row.get(5)?,
            device_info: row.get(6)?,
            user_agent: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            error_detail: row.get(9)?,
            app_version: row.get(10)?,
        })
    }
}

impl FromRow for DeviceHistory {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let ip_json: String = row.get(6)?;
        let ip_addresses = serde_json::from_str(&ip_json).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                6,
                "ip_addresses".to_string(),
                rusqlite::types::Type::Text,
            )
        })?;
        Ok(DeviceHistory {
            id: row.get(0)?,
            license_id: row.get(1)?,
            hw_id: row.get(2)?,
            device_info: row.get(3)?,
            first_seen: row.get(4)?,
            last_seen: row.get(5)?,
            ip_addresses,
            total_uses: row.get(7)?,
            is_current: row.get(8)?,
        })
    }
}

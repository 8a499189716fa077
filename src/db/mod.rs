mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state handed to every handler and the scheduler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Server-held admin secret, equality-checked per request.
    pub admin_secret: String,
    /// Prefix for generated license keys.
    pub license_prefix: String,
    /// Delay before a reset license unlocks again.
    pub reactivation_delay_secs: i64,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // Foreign keys are off by default in SQLite; the cascade deletes from
    // licenses to their audit/device rows depend on them.
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}

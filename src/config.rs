use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Shared secret for the admin API. Empty means "not configured".
    pub admin_secret: String,
    /// Prefix for generated license keys (e.g. "VB" -> VB-XXXX-...).
    pub license_prefix: String,
    /// Delay before a reset license unlocks again. Deliberately longer than
    /// the client poll interval (~60s) so a running client observes the
    /// revocation at least once before the window reopens.
    pub reactivation_delay_secs: i64,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("VAULTBIND_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "vaultbind.db".to_string()),
            admin_secret: env::var("ADMIN_SECRET").unwrap_or_default(),
            license_prefix: env::var("LICENSE_PREFIX").unwrap_or_else(|_| "VB".to_string()),
            reactivation_delay_secs: env::var("REACTIVATION_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(65),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

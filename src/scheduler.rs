//! Deferred reactivation for device resets.
//!
//! A reset revokes the license and clears its bound device, then queues an
//! unlock for `reactivation_delay_secs` later. The queue lives in the
//! `scheduled_reactivations` table so pending unlocks survive restarts;
//! [`rearm_pending`] re-spawns them at boot. Tasks are never cancelled:
//! correctness comes from the wake-time recheck in
//! `complete_scheduled_reactivation` (still revoked, still unbound), not
//! from cancelling overtaken timers.

use std::time::Duration;

use chrono::Utc;

use crate::db::{queries, AppState};
use crate::error::Result;

/// Spawn a task that sleeps until `run_at`, then performs the conditional
/// unlock. Already-due jobs run immediately.
pub fn spawn_reactivation(state: AppState, license_id: String, run_at: i64) {
    tokio::spawn(async move {
        let now = Utc::now().timestamp();
        if run_at > now {
            tokio::time::sleep(Duration::from_secs((run_at - now) as u64)).await;
        }

        match state.db.get() {
            Ok(mut conn) => {
                match queries::complete_scheduled_reactivation(&mut conn, &license_id) {
                    Ok(true) => {
                        tracing::info!(license_id = %license_id, "license unlocked after device reset");
                    }
                    Ok(false) => {
                        tracing::debug!(
                            license_id = %license_id,
                            "scheduled unlock skipped, license state changed in the meantime"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(license_id = %license_id, "scheduled unlock failed: {}", e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("failed to get db connection for scheduled unlock: {}", e);
            }
        }
    });
}

/// Re-arm every queued reactivation from the database. Called once at
/// startup. Returns how many tasks were spawned.
pub fn rearm_pending(state: &AppState) -> Result<usize> {
    let conn = state.db.get()?;
    let pending = queries::pending_reactivations(&conn)?;
    let count = pending.len();

    for (license_id, run_at) in pending {
        spawn_reactivation(state.clone(), license_id, run_at);
    }

    Ok(count)
}

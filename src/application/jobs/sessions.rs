//! Cron job deleting expired login sessions.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::{Data, Error as ApalisError};
use apalis_cron::Schedule;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::UserStore;

/// Marker for the cron tick. apalis-cron requires
/// `From<chrono::DateTime<chrono::Utc>>` on the job type.
#[derive(Default, Debug, Clone)]
pub struct SessionSweepJob;

impl From<chrono::DateTime<chrono::Utc>> for SessionSweepJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct SessionSweepContext {
    pub users: Arc<dyn UserStore>,
}

/// Deletes every session past its expiry. Best-effort: failures are
/// logged and the next tick retries.
pub async fn process_session_sweep_job(
    _job: SessionSweepJob,
    ctx: Data<SessionSweepContext>,
) -> Result<(), ApalisError> {
    match ctx.users.delete_expired_sessions(OffsetDateTime::now_utc()).await {
        Ok(swept) if swept > 0 => {
            info!(swept, "Deleted expired sessions");
        }
        Err(err) => {
            warn!(error = %err, "Session sweep failed");
        }
        _ => {}
    }
    Ok(())
}

/// Hourly, at minute 0.
pub fn session_sweep_schedule() -> Schedule {
    Schedule::from_str("0 0 * * * *").expect("session sweep cron expression parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_schedule_yields_upcoming_ticks() {
        let schedule = session_sweep_schedule();
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}

//! Periodic expiration of abandoned verifications.

use domain::services::ExpirationSweeper;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_sessions_expired;

pub struct ExpireSessionsJob {
    sweeper: ExpirationSweeper,
    interval_secs: u64,
}

impl ExpireSessionsJob {
    pub fn new(sweeper: ExpirationSweeper, interval_secs: u64) -> Self {
        Self {
            sweeper,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for ExpireSessionsJob {
    fn name(&self) -> &'static str {
        "expire_sessions"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let expired = self.sweeper.sweep().await.map_err(|e| e.to_string())?;
        if expired > 0 {
            record_sessions_expired(expired);
        }
        Ok(())
    }
}

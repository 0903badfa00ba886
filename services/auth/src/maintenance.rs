//! Periodic cleanup of expired password reset tokens

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::repositories::IdentityStore;

/// Top of every hour
pub const HOURLY: &str = "0 0 * * * *";

#[derive(Clone)]
pub struct TokenSweeper {
    users: Arc<dyn IdentityStore>,
}

impl TokenSweeper {
    pub fn new(users: Arc<dyn IdentityStore>) -> Self {
        Self { users }
    }

    /// Delete expired reset tokens once
    pub async fn sweep(&self) -> Result<u64> {
        let purged = self.users.purge_expired_reset_tokens().await?;
        if purged > 0 {
            info!("Purged {} expired password reset tokens", purged);
        }
        Ok(purged)
    }

    /// Run [`Self::sweep`] on `schedule`; keep the returned scheduler alive
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler> {
        let sweeper = self.clone();
        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_, _| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                if let Err(e) = sweeper.sweep().await {
                    error!("Failed to purge reset tokens: {}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started token sweeper with schedule: {}", schedule);
        Ok(scheduler)
    }
}

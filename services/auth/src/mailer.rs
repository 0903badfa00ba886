//! Outgoing account email

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<()>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<()> {
        info!("Password reset email queued for {}", to);
        debug!("Password reset link for {}: {}", to, reset_link);
        Ok(())
    }
}

#[cfg(test)]
pub mod recording {
    use super::*;
    use tokio::sync::Mutex;

    /// Keeps every message for assertions
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        pub async fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((to.to_string(), reset_link.to_string()));
            Ok(())
        }
    }
}

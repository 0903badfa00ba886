//! Session and lockout state kept in the cache
//!
//! Key layout:
//! - `session:<sid>` JSON [`SessionRecord`], expires with the session
//! - `user_sessions:<uid>` set of session ids owned by a user
//! - `failed_login:<uid>` failed attempt counter, expires after the window
//! - `lockout:<uid>` RFC 3339 unlock time, expires when the lock lifts

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{auth::Role, cache::Cache, settings::LockoutSettings, token::generate_token};

const SESSION_PREFIX: &str = "session:";
const USER_SESSIONS_PREFIX: &str = "user_sessions:";
const FAILED_LOGIN_PREFIX: &str = "failed_login:";
const LOCKOUT_PREFIX: &str = "lockout:";

/// A live login session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    /// Anti-forgery token bound to this session
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub csrf_token: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Copy safe to show to administrators
    pub fn redacted(&self) -> Self {
        Self {
            csrf_token: String::new(),
            ..self.clone()
        }
    }
}

/// Where a login came from
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Aggregate numbers for the security dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub active_sessions: usize,
    pub failed_attempts: i64,
    pub locked_users: usize,
}

/// Everything known about one user's sessions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub sessions: Vec<SessionRecord>,
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Result of recording a failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAttempt {
    /// Counted; `remaining` more failures lock the account
    Recorded { attempts: u32, remaining: u32 },
    /// The account is locked until the given time
    Locked {
        until: DateTime<Utc>,
        /// True when this very attempt triggered the lock
        newly_locked: bool,
    },
}

/// Failed-login thresholds
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window_seconds: u64,
    pub lockout_seconds: u64,
}

impl From<&LockoutSettings> for LockoutPolicy {
    fn from(settings: &LockoutSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window_seconds: settings.window_seconds,
            lockout_seconds: settings.lockout_seconds,
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from(&LockoutSettings::default())
    }
}

/// Session manager for handling user sessions in the cache
#[derive(Clone)]
pub struct SessionManager {
    cache: Arc<dyn Cache>,
    ttl_seconds: u64,
    policy: LockoutPolicy,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(cache: Arc<dyn Cache>, ttl_seconds: u64, policy: LockoutPolicy) -> Self {
        Self {
            cache,
            ttl_seconds,
            policy,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Create a new session for a user
    pub async fn create_session(
        &self,
        user_id: Uuid,
        role: Role,
        client: ClientInfo,
    ) -> Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id,
            role,
            csrf_token: generate_token(32),
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            created_at: now,
            expires_at: now + ChronoDuration::seconds(self.ttl_seconds as i64),
        };

        self.cache
            .set(
                &session_key(record.id),
                &serde_json::to_string(&record)?,
                Some(self.ttl_seconds),
            )
            .await?;
        // Drop index entries of sessions that expired since the last login
        self.active_sessions(user_id).await?;
        self.cache
            .set_add(&user_sessions_key(user_id), &record.id.to_string())
            .await?;

        info!("Created session {} for user {}", record.id, user_id);
        Ok(record)
    }

    /// Get a live session by id
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        match self.cache.get(&session_key(session_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Delete a single session; returns whether it was still live
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<bool> {
        let Some(record) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        self.cache.delete(&session_key(session_id)).await?;
        self.cache
            .set_remove(&user_sessions_key(record.user_id), &session_id.to_string())
            .await?;

        info!("Revoked session {} of user {}", session_id, record.user_id);
        Ok(true)
    }

    /// Delete every session of a user (logout from all devices).
    ///
    /// Idempotent: a user without sessions yields `Ok(0)`.
    pub async fn force_logout_user(&self, user_id: Uuid) -> Result<usize> {
        let index_key = user_sessions_key(user_id);
        let mut revoked = 0;

        for member in self.cache.set_members(&index_key).await? {
            let Ok(session_id) = Uuid::parse_str(&member) else {
                warn!("Dropping malformed session id {} for user {}", member, user_id);
                continue;
            };
            let key = session_key(session_id);
            if self.cache.get(&key).await?.is_some() {
                self.cache.delete(&key).await?;
                revoked += 1;
            }
        }
        self.cache.delete(&index_key).await?;

        info!("Force logout of user {} revoked {} session(s)", user_id, revoked);
        Ok(revoked)
    }

    /// Live sessions of a user, pruning index entries whose session expired
    pub async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>> {
        let index_key = user_sessions_key(user_id);
        let mut sessions = Vec::new();

        for member in self.cache.set_members(&index_key).await? {
            let live = match Uuid::parse_str(&member) {
                Ok(session_id) => self.get_session(session_id).await?,
                Err(_) => None,
            };
            match live {
                Some(record) => sessions.push(record),
                None => self.cache.set_remove(&index_key, &member).await?,
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Sessions, failed attempts and lock state of a user
    pub async fn session_info(&self, user_id: Uuid) -> Result<SessionInfo> {
        let sessions = self
            .active_sessions(user_id)
            .await?
            .iter()
            .map(SessionRecord::redacted)
            .collect();

        Ok(SessionInfo {
            user_id,
            sessions,
            failed_attempts: self.failed_attempts(user_id).await?,
            locked_until: self.lock_status(user_id).await?,
        })
    }

    /// Aggregate counts across all users
    pub async fn stats(&self) -> Result<SessionStats> {
        let active_sessions = self.cache.keys(SESSION_PREFIX).await?.len();

        let mut failed_attempts = 0;
        for key in self.cache.keys(FAILED_LOGIN_PREFIX).await? {
            failed_attempts += self
                .cache
                .get(&key)
                .await?
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
        }

        let locked_users = self.cache.keys(LOCKOUT_PREFIX).await?.len();

        Ok(SessionStats {
            active_sessions,
            failed_attempts,
            locked_users,
        })
    }

    /// Count a failed login and lock the account once the threshold is hit
    pub async fn record_failed_login(&self, user_id: Uuid) -> Result<LoginAttempt> {
        if let Some(until) = self.lock_status(user_id).await? {
            return Ok(LoginAttempt::Locked {
                until,
                newly_locked: false,
            });
        }

        let attempts = self
            .cache
            .incr(&failed_login_key(user_id), self.policy.window_seconds)
            .await?;
        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);

        if attempts >= self.policy.max_attempts {
            let until = Utc::now() + ChronoDuration::seconds(self.policy.lockout_seconds as i64);
            self.cache
                .set(
                    &lockout_key(user_id),
                    &until.to_rfc3339(),
                    Some(self.policy.lockout_seconds),
                )
                .await?;
            // A fresh window starts once the lock lifts
            self.cache.delete(&failed_login_key(user_id)).await?;

            warn!(
                "Locked user {} after {} failed login attempts",
                user_id, attempts
            );
            return Ok(LoginAttempt::Locked {
                until,
                newly_locked: true,
            });
        }

        debug!("Failed login {} for user {}", attempts, user_id);
        Ok(LoginAttempt::Recorded {
            attempts,
            remaining: self.policy.max_attempts - attempts,
        })
    }

    /// Reset the failed attempt counter after a good login
    pub async fn record_successful_login(&self, user_id: Uuid) -> Result<()> {
        self.cache.delete(&failed_login_key(user_id)).await
    }

    /// Current failed attempt count inside the window
    pub async fn failed_attempts(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .cache
            .get(&failed_login_key(user_id))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// Unlock time when the account is locked
    pub async fn lock_status(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.cache.get(&lockout_key(user_id)).await? else {
            return Ok(None);
        };
        Ok(DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|until| until.with_timezone(&Utc)))
    }

    /// Manual unlock; returns whether a lock was present
    pub async fn clear_lockout(&self, user_id: Uuid) -> Result<bool> {
        let was_locked = self.lock_status(user_id).await?.is_some();
        self.cache.delete(&lockout_key(user_id)).await?;
        self.cache.delete(&failed_login_key(user_id)).await?;
        Ok(was_locked)
    }

    /// Get cache health status
    pub async fn health_check(&self) -> Result<bool> {
        self.cache.health_check().await
    }
}

fn session_key(session_id: Uuid) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

fn user_sessions_key(user_id: Uuid) -> String {
    format!("{}{}", USER_SESSIONS_PREFIX, user_id)
}

fn failed_login_key(user_id: Uuid) -> String {
    format!("{}{}", FAILED_LOGIN_PREFIX, user_id)
}

fn lockout_key(user_id: Uuid) -> String {
    format!("{}{}", LOCKOUT_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(MemoryCache::new()),
            3600,
            LockoutPolicy {
                max_attempts: 3,
                window_seconds: 900,
                lockout_seconds: 900,
            },
        )
    }

    #[tokio::test]
    async fn test_create_get_revoke() -> Result<()> {
        let sessions = manager();
        let user_id = Uuid::new_v4();

        let record = sessions
            .create_session(user_id, Role::User, ClientInfo::default())
            .await?;
        assert_eq!(record.csrf_token.len(), 32);
        assert_eq!(sessions.get_session(record.id).await?, Some(record.clone()));

        assert!(sessions.revoke_session(record.id).await?);
        assert_eq!(sessions.get_session(record.id).await?, None);
        assert!(!sessions.revoke_session(record.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_force_logout_is_idempotent() -> Result<()> {
        let sessions = manager();
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = sessions
            .create_session(user_id, Role::User, ClientInfo::default())
            .await?;
        let second = sessions
            .create_session(user_id, Role::User, ClientInfo::default())
            .await?;
        let kept = sessions
            .create_session(other, Role::Admin, ClientInfo::default())
            .await?;

        assert_eq!(sessions.force_logout_user(user_id).await?, 2);
        assert_eq!(sessions.get_session(first.id).await?, None);
        assert_eq!(sessions.get_session(second.id).await?, None);
        assert!(sessions.get_session(kept.id).await?.is_some());

        assert_eq!(sessions.force_logout_user(user_id).await?, 0);
        assert_eq!(sessions.force_logout_user(Uuid::new_v4()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_lockout_after_threshold() -> Result<()> {
        let sessions = manager();
        let user_id = Uuid::new_v4();

        assert_eq!(
            sessions.record_failed_login(user_id).await?,
            LoginAttempt::Recorded {
                attempts: 1,
                remaining: 2
            }
        );
        sessions.record_failed_login(user_id).await?;

        let third = sessions.record_failed_login(user_id).await?;
        assert!(matches!(
            third,
            LoginAttempt::Locked {
                newly_locked: true,
                ..
            }
        ));
        assert!(sessions.lock_status(user_id).await?.is_some());

        let fourth = sessions.record_failed_login(user_id).await?;
        assert!(matches!(
            fourth,
            LoginAttempt::Locked {
                newly_locked: false,
                ..
            }
        ));

        assert!(sessions.clear_lockout(user_id).await?);
        assert_eq!(sessions.lock_status(user_id).await?, None);
        assert!(!sessions.clear_lockout(user_id).await?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_login_prunes_expired_sessions() -> Result<()> {
        let cache = Arc::new(MemoryCache::new());
        let sessions = SessionManager::new(cache.clone(), 3600, LockoutPolicy::default());
        let user_id = Uuid::new_v4();

        for _ in 0..3 {
            sessions
                .create_session(user_id, Role::User, ClientInfo::default())
                .await?;
        }
        tokio::time::advance(Duration::from_secs(3601)).await;

        let fresh = sessions
            .create_session(user_id, Role::User, ClientInfo::default())
            .await?;
        assert_eq!(
            cache.set_members(&user_sessions_key(user_id)).await?,
            vec![fresh.id.to_string()]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_expires() -> Result<()> {
        let sessions = manager();
        let user_id = Uuid::new_v4();

        for _ in 0..3 {
            sessions.record_failed_login(user_id).await?;
        }
        assert!(sessions.lock_status(user_id).await?.is_some());

        tokio::time::advance(Duration::from_secs(901)).await;
        assert_eq!(sessions.lock_status(user_id).await?, None);
        assert_eq!(
            sessions.record_failed_login(user_id).await?,
            LoginAttempt::Recorded {
                attempts: 1,
                remaining: 2
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_login_resets_counter() -> Result<()> {
        let sessions = manager();
        let user_id = Uuid::new_v4();

        sessions.record_failed_login(user_id).await?;
        sessions.record_failed_login(user_id).await?;
        sessions.record_successful_login(user_id).await?;

        assert_eq!(sessions.failed_attempts(user_id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_and_info() -> Result<()> {
        let sessions = manager();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        sessions
            .create_session(alice, Role::User, ClientInfo::default())
            .await?;
        sessions
            .create_session(bob, Role::Admin, ClientInfo::default())
            .await?;
        sessions.record_failed_login(alice).await?;
        for _ in 0..3 {
            sessions.record_failed_login(bob).await?;
        }

        let stats = sessions.stats().await?;
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.failed_attempts, 1);
        assert_eq!(stats.locked_users, 1);

        let info = sessions.session_info(alice).await?;
        assert_eq!(info.sessions.len(), 1);
        assert!(info.sessions[0].csrf_token.is_empty());
        assert_eq!(info.failed_attempts, 1);
        assert!(info.locked_until.is_none());
        Ok(())
    }
}

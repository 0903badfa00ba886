//! User repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{NewUser, ResetToken, User};

/// Returned by [`IdentityStore::create_user`] when the email is taken
#[derive(Debug, Error)]
#[error("email already registered")]
pub struct DuplicateEmail;

/// Account and reset token storage used by the auth handlers
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Fails with [`DuplicateEmail`] when the address is already used
    async fn create_user(&self, new_user: &NewUser) -> Result<User>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    /// Store a reset token, dropping any earlier token for the same identifier
    async fn replace_reset_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Remove and return the token with this hash. A token can be taken once.
    async fn take_reset_token(&self, token_hash: &str) -> Result<Option<ResetToken>>;

    /// Delete expired reset tokens, returning how many went
    async fn purge_expired_reset_tokens(&self) -> Result<u64>;
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, role, is_active, created_at, updated_at";

#[async_trait]
impl IdentityStore for UserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        debug!("Finding user by email: {}", email);

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        debug!("Finding user by ID: {}", id);

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.email);

        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(DuplicateEmail.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_reset_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1")
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO verification_tokens (identifier, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(identifier)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn take_reset_token(&self, token_hash: &str) -> Result<Option<ResetToken>> {
        let token = sqlx::query_as::<_, ResetToken>(
            r#"
            DELETE FROM verification_tokens
            WHERE token_hash = $1 AND identifier LIKE 'pw:%'
            RETURNING identifier, expires_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn purge_expired_reset_tokens(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM verification_tokens WHERE identifier LIKE 'pw:%' AND expires_at <= NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use common::auth::Role;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Store backed by hash maps for handler tests
    #[derive(Default)]
    pub struct MemoryIdentityStore {
        users: Mutex<HashMap<Uuid, User>>,
        /// token hash -> token
        tokens: Mutex<HashMap<String, ResetToken>>,
    }

    impl MemoryIdentityStore {
        pub async fn set_role(&self, user_id: Uuid, role: Role) {
            if let Some(user) = self.users.lock().await.get_mut(&user_id) {
                user.role = role;
            }
        }

        pub async fn set_active(&self, user_id: Uuid, is_active: bool) {
            if let Some(user) = self.users.lock().await.get_mut(&user_id) {
                user.is_active = is_active;
            }
        }

        pub async fn token_count(&self) -> usize {
            self.tokens.lock().await.len()
        }
    }

    #[async_trait]
    impl IdentityStore for MemoryIdentityStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .await
                .values()
                .find(|user| user.email == email)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
            Ok(self.users.lock().await.get(&id).cloned())
        }

        async fn create_user(&self, new_user: &NewUser) -> Result<User> {
            let mut users = self.users.lock().await;
            if users.values().any(|user| user.email == new_user.email) {
                return Err(DuplicateEmail.into());
            }

            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                email: new_user.email.clone(),
                name: new_user.name.clone(),
                password_hash: new_user.password_hash.clone(),
                role: Role::User,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
            if let Some(user) = self.users.lock().await.get_mut(&user_id) {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn replace_reset_token(
            &self,
            identifier: &str,
            token_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<()> {
            let mut tokens = self.tokens.lock().await;
            tokens.retain(|_, token| token.identifier != identifier);
            tokens.insert(
                token_hash.to_string(),
                ResetToken {
                    identifier: identifier.to_string(),
                    expires_at,
                },
            );
            Ok(())
        }

        async fn take_reset_token(&self, token_hash: &str) -> Result<Option<ResetToken>> {
            Ok(self.tokens.lock().await.remove(token_hash))
        }

        async fn purge_expired_reset_tokens(&self) -> Result<u64> {
            let mut tokens = self.tokens.lock().await;
            let before = tokens.len();
            let now = Utc::now();
            tokens.retain(|_, token| !token.is_expired(now));
            Ok((before - tokens.len()) as u64)
        }
    }
}

//! Account data used by the user area and user administration

use anyhow::Result;
use common::auth::Role;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Duplicate, like_pattern, unique_violation};
use crate::models::{AdminUserQuery, UserProfile};

const PROFILE_COLUMNS: &str = "id, email, name, role, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        debug!("Finding user by ID: {}", id);

        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn password_hash(&self, id: Uuid) -> Result<Option<String>> {
        let hash = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    /// Fails with [`Duplicate`] when the email belongs to someone else
    pub async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserProfile>> {
        let result = sqlx::query_as::<_, UserProfile>(&format!(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email), \
             updated_at = NOW() WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) if unique_violation(&e) => Err(Duplicate("Email").into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn settings(&self, id: Uuid) -> Result<Option<Value>> {
        let settings = sqlx::query_scalar("SELECT settings FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(settings)
    }

    /// Shallow merge; keys in `patch` replace stored keys
    pub async fn merge_settings(
        &self,
        id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<Option<Value>> {
        let settings = sqlx::query_scalar(
            "UPDATE users SET settings = settings || $2, updated_at = NOW() \
             WHERE id = $1 RETURNING settings",
        )
        .bind(id)
        .bind(Value::Object(patch.clone()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(settings)
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AdminUserQuery) {
        builder.push(" WHERE TRUE");
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = like_pattern(search);
            builder
                .push(" AND (email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(role) = query.role {
            builder.push(" AND role = ").push_bind(role);
        }
    }

    /// Newest accounts first
    pub async fn list(&self, query: &AdminUserQuery) -> Result<(Vec<UserProfile>, i64)> {
        let page = query.page_params();

        let mut select = QueryBuilder::new(format!("SELECT {} FROM users", PROFILE_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let users = select
            .build_query_as::<UserProfile>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((users, total))
    }

    pub async fn admin_update(
        &self,
        id: Uuid,
        is_active: Option<bool>,
        role: Option<Role>,
    ) -> Result<Option<UserProfile>> {
        info!("Updating account {}: active={:?} role={:?}", id, is_active, role);

        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "UPDATE users SET is_active = COALESCE($2, is_active), role = COALESCE($3, role), \
             updated_at = NOW() WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(is_active)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

//! User model and related functionality

use chrono::{DateTime, Utc};
use common::auth::Role;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
}

/// What a client gets to see about an account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// A consumed password reset token
#[derive(Debug, Clone, FromRow)]
pub struct ResetToken {
    /// `pw:<user id>`
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub const PREFIX: &'static str = "pw:";

    pub fn identifier_for(user_id: Uuid) -> String {
        format!("{}{}", Self::PREFIX, user_id)
    }

    /// Owner of the token, if the identifier is well formed
    pub fn user_id(&self) -> Option<Uuid> {
        self.identifier
            .strip_prefix(Self::PREFIX)
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

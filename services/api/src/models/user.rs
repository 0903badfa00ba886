//! Account area and user administration models

use chrono::{DateTime, Utc};
use common::{
    auth::Role,
    http::PageParams,
    validation::{validate_not_blank, validate_password_strength},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Largest settings document accepted once serialized
pub const MAX_SETTINGS_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

/// Keys to merge into the stored settings document
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SettingsPatch {
    #[validate(custom(function = "validate_settings_size"))]
    pub settings: Map<String, Value>,
}

fn validate_settings_size(settings: &Map<String, Value>) -> Result<(), ValidationError> {
    let size = serde_json::to_string(settings).map(|s| s.len()).unwrap_or(usize::MAX);
    if size > MAX_SETTINGS_BYTES {
        let mut error = ValidationError::new("settings_size");
        error.message = Some(Cow::Borrowed("Settings must be at most 16 KiB"));
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub coupon_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[validate(length(max = 100))]
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl AdminUserQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_admin_patch", skip_on_field_errors = false))]
pub struct AdminUserPatch {
    pub user_id: Uuid,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

fn validate_admin_patch(patch: &AdminUserPatch) -> Result<(), ValidationError> {
    if patch.is_active.is_none() && patch.role.is_none() {
        let mut error = ValidationError::new("empty_patch");
        error.message = Some(Cow::Borrowed("Nothing to update"));
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ForceLogoutRequest {
    pub user_id: Uuid,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub user_id: Option<Uuid>,
}

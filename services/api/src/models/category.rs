//! Category models

use chrono::{DateTime, Utc};
use common::validation::{validate_hex_color, validate_not_blank, validate_slug};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category with the number of active coupons filed under it
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub category: Category,
    pub coupon_count: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[validate(
        length(min = 1, max = 60, message = "Name must be 1 to 60 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(length(max = 80), custom(function = "validate_slug"))]
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub icon: Option<String>,
    #[validate(custom(function = "validate_hex_color"))]
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    #[validate(
        length(min = 1, max = 60, message = "Name must be 1 to 60 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    #[validate(length(max = 80), custom(function = "validate_slug"))]
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub icon: Option<String>,
    #[validate(custom(function = "validate_hex_color"))]
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListQuery {
    /// Honoured for administrators only
    pub include_inactive: Option<bool>,
}

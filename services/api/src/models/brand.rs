//! Brand models

use chrono::{DateTime, Utc};
use common::{
    http::PageParams,
    validation::{validate_not_blank, validate_slug},
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
    pub is_sponsored: bool,
    pub sponsor_weight: i32,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrandRequest {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    /// Derived from the name when omitted
    #[validate(length(max = 120), custom(function = "validate_slug"))]
    pub slug: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url(message = "Logo URL must be a valid URL"))]
    pub logo_url: Option<String>,
    #[validate(url(message = "Website URL must be a valid URL"))]
    pub website_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_sponsored: Option<bool>,
    #[validate(range(min = 0, max = 1000))]
    pub sponsor_weight: Option<i32>,
    #[validate(length(max = 70))]
    pub seo_title: Option<String>,
    #[validate(length(max = 160))]
    pub seo_description: Option<String>,
}

/// Partial update; absent fields are left as they are
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BrandUpdate {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    #[validate(length(max = 120), custom(function = "validate_slug"))]
    pub slug: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url(message = "Logo URL must be a valid URL"))]
    pub logo_url: Option<String>,
    #[validate(url(message = "Website URL must be a valid URL"))]
    pub website_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_sponsored: Option<bool>,
    #[validate(range(min = 0, max = 1000))]
    pub sponsor_weight: Option<i32>,
    #[validate(length(max = 70))]
    pub seo_title: Option<String>,
    #[validate(length(max = 160))]
    pub seo_description: Option<String>,
}

/// Row about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewBrand {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
    pub is_sponsored: bool,
    pub sponsor_weight: i32,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

impl NewBrand {
    pub fn from_request(request: CreateBrandRequest, slug: String) -> Self {
        Self {
            name: request.name.trim().to_string(),
            slug,
            description: request.description,
            logo_url: request.logo_url,
            website_url: request.website_url,
            is_active: request.is_active.unwrap_or(true),
            is_sponsored: request.is_sponsored.unwrap_or(false),
            sponsor_weight: request.sponsor_weight.unwrap_or(0),
            seo_title: request.seo_title,
            seo_description: request.seo_description,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BrandListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[validate(length(max = 100))]
    pub search: Option<String>,
    /// Honoured for administrators only
    pub include_inactive: Option<bool>,
}

impl BrandListQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// `?limit=` for the sponsored listings
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SponsoredQuery {
    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<u32>,
}

impl SponsoredQuery {
    pub fn limit(&self) -> i64 {
        i64::from(self.limit.unwrap_or(10))
    }
}

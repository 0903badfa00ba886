//! Coupon usage records

use chrono::{DateTime, Utc};
use common::http::PageParams;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Append-only usage row
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub used_at: DateTime<Utc>,
}

/// Usage row with the coupon it refers to
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UsageView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub usage: CouponUsage,
    pub coupon_title: String,
    pub brand_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUsage {
    pub coupon_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub coupon_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl UsageQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

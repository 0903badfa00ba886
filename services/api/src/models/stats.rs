//! Dashboard aggregates

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::UsageView;

#[derive(Debug, Clone, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub users: i64,
    pub active_users: i64,
    pub brands: i64,
    pub categories: i64,
    pub coupons: i64,
    pub active_coupons: i64,
    pub pending_submissions: i64,
    pub total_usages: i64,
    pub usages_last_7_days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub favorite_count: i64,
    pub usage_count: i64,
    pub recent_usages: Vec<UsageView>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AnalyticsQuery {
    #[validate(range(min = 1, max = 90, message = "Days must be between 1 and 90"))]
    pub days: Option<u32>,
}

impl AnalyticsQuery {
    pub const DEFAULT_DAYS: u32 = 30;

    pub fn days(&self) -> u32 {
        self.days.unwrap_or(Self::DEFAULT_DAYS)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyUsage {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopCoupon {
    pub coupon_id: Uuid,
    pub title: String,
    pub uses: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalytics {
    pub days: u32,
    pub daily: Vec<DailyUsage>,
    pub top_coupons: Vec<TopCoupon>,
}

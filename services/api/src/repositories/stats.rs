//! Aggregate queries for the dashboards

use anyhow::Result;
use sqlx::PgPool;

use crate::models::{AdminStats, DailyUsage, TopCoupon};

const TOP_COUPONS: i64 = 10;

#[derive(Clone)]
pub struct StatsRepository {
    pool: PgPool,
}

impl StatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn admin_stats(&self) -> Result<AdminStats> {
        let stats = sqlx::query_as::<_, AdminStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM users WHERE is_active) AS active_users,
                (SELECT COUNT(*) FROM brands) AS brands,
                (SELECT COUNT(*) FROM categories) AS categories,
                (SELECT COUNT(*) FROM coupons) AS coupons,
                (SELECT COUNT(*) FROM coupons WHERE is_active) AS active_coupons,
                (SELECT COUNT(*) FROM user_submissions WHERE status = 'PENDING')
                    AS pending_submissions,
                (SELECT COUNT(*) FROM coupon_usages) AS total_usages,
                (SELECT COUNT(*) FROM coupon_usages WHERE used_at >= NOW() - INTERVAL '7 days')
                    AS usages_last_7_days
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Uses per calendar day (UTC) over the last `days` days
    pub async fn daily_usage(&self, days: u32) -> Result<Vec<DailyUsage>> {
        let daily = sqlx::query_as::<_, DailyUsage>(
            r#"
            SELECT (used_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
            FROM coupon_usages
            WHERE used_at >= NOW() - make_interval(days => $1)
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(days as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(daily)
    }

    pub async fn top_coupons(&self, days: u32) -> Result<Vec<TopCoupon>> {
        let top = sqlx::query_as::<_, TopCoupon>(
            r#"
            SELECT c.id AS coupon_id, c.title, COUNT(u.id) AS uses
            FROM coupon_usages u
            JOIN coupons c ON c.id = u.coupon_id
            WHERE u.used_at >= NOW() - make_interval(days => $1)
            GROUP BY c.id, c.title
            ORDER BY uses DESC, c.title
            LIMIT $2
            "#,
        )
        .bind(days as i32)
        .bind(TOP_COUPONS)
        .fetch_all(&self.pool)
        .await?;
        Ok(top)
    }
}

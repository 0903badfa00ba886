//! Coupon usage and favorite repositories

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{CouponView, NewUsage, UsageQuery, UsageView};

const USAGE_VIEW_SELECT: &str = r#"
    SELECT u.id, u.coupon_id, u.user_id, u.ip_address, u.user_agent, u.used_at,
           c.title AS coupon_title, b.name AS brand_name
    FROM coupon_usages u
    JOIN coupons c ON c.id = u.coupon_id
    JOIN brands b ON b.id = c.brand_id
"#;

#[derive(Clone)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, usage: &NewUsage) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupon_usages (coupon_id, user_id, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(usage.coupon_id)
        .bind(usage.user_id)
        .bind(&usage.ip_address)
        .bind(&usage.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UsageQuery) {
        builder.push(" WHERE TRUE");
        if let Some(coupon_id) = query.coupon_id {
            builder.push(" AND u.coupon_id = ").push_bind(coupon_id);
        }
        if let Some(user_id) = query.user_id {
            builder.push(" AND u.user_id = ").push_bind(user_id);
        }
    }

    /// Newest first
    pub async fn list(&self, query: &UsageQuery) -> Result<(Vec<UsageView>, i64)> {
        let page = query.page_params();

        let mut select = QueryBuilder::new(USAGE_VIEW_SELECT);
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY u.used_at DESC LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let usages = select
            .build_query_as::<UsageView>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM coupon_usages u");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((usages, total))
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<UsageView>> {
        let usages = sqlx::query_as::<_, UsageView>(&format!(
            "{} WHERE u.user_id = $1 ORDER BY u.used_at DESC LIMIT $2",
            USAGE_VIEW_SELECT
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(usages)
    }
}

#[derive(Clone)]
pub struct FavoriteRepository {
    pool: PgPool,
}

impl FavoriteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Favorited coupons, most recently added first
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<CouponView>> {
        let coupons = sqlx::query_as::<_, CouponView>(
            r#"
            SELECT c.id, c.title, c.description, c.code, c.coupon_type, c.discount_type,
                   c.discount_value, c.min_order_value, c.max_discount, c.usage_limit,
                   c.used_count, c.valid_from, c.valid_until, c.affiliate_url, c.is_active,
                   c.is_verified, c.is_exclusive, c.is_sponsored, c.sponsor_weight,
                   c.brand_id, c.category_id, c.created_at, c.updated_at,
                   b.name AS brand_name, b.slug AS brand_slug, b.logo_url AS brand_logo_url,
                   cat.name AS category_name, cat.slug AS category_slug
            FROM favorite_coupons f
            JOIN coupons c ON c.id = f.coupon_id
            JOIN brands b ON b.id = c.brand_id
            JOIN categories cat ON cat.id = c.category_id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(coupons)
    }

    /// `false` when it was already a favorite
    pub async fn add(&self, user_id: Uuid, coupon_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO favorite_coupons (user_id, coupon_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, coupon_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(coupon_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(&self, user_id: Uuid, coupon_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM favorite_coupons WHERE user_id = $1 AND coupon_id = $2")
                .bind(user_id)
                .bind(coupon_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self, user_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM favorite_coupons WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

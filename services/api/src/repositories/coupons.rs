//! Coupon repository

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::like_pattern;
use crate::{
    models::{Coupon, CouponListQuery, CouponUpdate, CouponView, NewCoupon},
    redemption::CouponAvailability,
};

const COUPON_COLUMNS: &str = "id, title, description, code, coupon_type, discount_type, \
    discount_value, min_order_value, max_discount, usage_limit, used_count, valid_from, \
    valid_until, affiliate_url, is_active, is_verified, is_exclusive, is_sponsored, \
    sponsor_weight, brand_id, category_id, created_at, updated_at";

const VIEW_SELECT: &str = r#"
    SELECT c.id, c.title, c.description, c.code, c.coupon_type, c.discount_type,
           c.discount_value, c.min_order_value, c.max_discount, c.usage_limit, c.used_count,
           c.valid_from, c.valid_until, c.affiliate_url, c.is_active, c.is_verified,
           c.is_exclusive, c.is_sponsored, c.sponsor_weight, c.brand_id, c.category_id,
           c.created_at, c.updated_at,
           b.name AS brand_name, b.slug AS brand_slug, b.logo_url AS brand_logo_url,
           cat.name AS category_name, cat.slug AS category_slug
    FROM coupons c
    JOIN brands b ON b.id = c.brand_id
    JOIN categories cat ON cat.id = c.category_id
"#;

const VIEW_ORDER: &str =
    " ORDER BY c.is_sponsored DESC, c.sponsor_weight DESC, c.created_at DESC";

#[derive(Clone)]
pub struct CouponRepository {
    pool: PgPool,
}

impl CouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Postgres>,
        query: &CouponListQuery,
        include_inactive: bool,
    ) {
        builder.push(" WHERE TRUE");
        if !include_inactive {
            builder.push(" AND c.is_active AND b.is_active");
        }
        if let Some(brand_id) = query.brand_id {
            builder.push(" AND c.brand_id = ").push_bind(brand_id);
        }
        if let Some(category_id) = query.category_id {
            builder.push(" AND c.category_id = ").push_bind(category_id);
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = like_pattern(search);
            builder
                .push(" AND (c.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(
        &self,
        query: &CouponListQuery,
        include_inactive: bool,
    ) -> Result<(Vec<CouponView>, i64)> {
        let page = query.page_params();

        let mut select = QueryBuilder::new(VIEW_SELECT);
        Self::push_filters(&mut select, query, include_inactive);
        select
            .push(VIEW_ORDER)
            .push(" LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let coupons = select
            .build_query_as::<CouponView>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new(
            "SELECT COUNT(*) FROM coupons c JOIN brands b ON b.id = c.brand_id",
        );
        Self::push_filters(&mut count, query, include_inactive);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((coupons, total))
    }

    pub async fn find_view(&self, id: Uuid) -> Result<Option<CouponView>> {
        let coupon = sqlx::query_as::<_, CouponView>(&format!("{} WHERE c.id = $1", VIEW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(coupon)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {} FROM coupons WHERE id = $1",
            COUPON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(coupon)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM coupons WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Active sponsored coupons, heaviest first
    pub async fn sponsored(&self, limit: i64) -> Result<Vec<CouponView>> {
        let coupons = sqlx::query_as::<_, CouponView>(&format!(
            "{} WHERE c.is_active AND c.is_sponsored AND b.is_active{} LIMIT $1",
            VIEW_SELECT, VIEW_ORDER
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(coupons)
    }

    pub async fn create(&self, coupon: &NewCoupon) -> Result<Coupon> {
        info!("Creating coupon: {}", coupon.title);

        let created = sqlx::query_as::<_, Coupon>(&format!(
            r#"
            INSERT INTO coupons
                (title, description, code, coupon_type, discount_type, discount_value,
                 min_order_value, max_discount, usage_limit, valid_from, valid_until,
                 affiliate_url, is_active, is_verified, is_exclusive, is_sponsored,
                 sponsor_weight, brand_id, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            RETURNING {}
            "#,
            COUPON_COLUMNS
        ))
        .bind(&coupon.title)
        .bind(&coupon.description)
        .bind(&coupon.code)
        .bind(coupon.coupon_type)
        .bind(coupon.discount_type)
        .bind(coupon.discount_value)
        .bind(coupon.min_order_value)
        .bind(coupon.max_discount)
        .bind(coupon.usage_limit)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(&coupon.affiliate_url)
        .bind(coupon.is_active)
        .bind(coupon.is_verified)
        .bind(coupon.is_exclusive)
        .bind(coupon.is_sponsored)
        .bind(coupon.sponsor_weight)
        .bind(coupon.brand_id)
        .bind(coupon.category_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// `None` when the coupon does not exist
    pub async fn update(&self, id: Uuid, update: &CouponUpdate) -> Result<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            r#"
            UPDATE coupons SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                code = COALESCE($4, code),
                coupon_type = COALESCE($5, coupon_type),
                discount_type = COALESCE($6, discount_type),
                discount_value = COALESCE($7, discount_value),
                min_order_value = COALESCE($8, min_order_value),
                max_discount = COALESCE($9, max_discount),
                usage_limit = COALESCE($10, usage_limit),
                valid_from = COALESCE($11, valid_from),
                valid_until = COALESCE($12, valid_until),
                affiliate_url = COALESCE($13, affiliate_url),
                is_active = COALESCE($14, is_active),
                is_verified = COALESCE($15, is_verified),
                is_exclusive = COALESCE($16, is_exclusive),
                is_sponsored = COALESCE($17, is_sponsored),
                sponsor_weight = COALESCE($18, sponsor_weight),
                brand_id = COALESCE($19, brand_id),
                category_id = COALESCE($20, category_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            COUPON_COLUMNS
        ))
        .bind(id)
        .bind(update.title.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(&update.code)
        .bind(update.coupon_type)
        .bind(update.discount_type)
        .bind(update.discount_value)
        .bind(update.min_order_value)
        .bind(update.max_discount)
        .bind(update.usage_limit)
        .bind(update.valid_from)
        .bind(update.valid_until)
        .bind(&update.affiliate_url)
        .bind(update.is_active)
        .bind(update.is_verified)
        .bind(update.is_exclusive)
        .bind(update.is_sponsored)
        .bind(update.sponsor_weight)
        .bind(update.brand_id)
        .bind(update.category_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Active coupons matching title, description or code
    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<CouponView>> {
        let coupons = sqlx::query_as::<_, CouponView>(&format!(
            "{} WHERE c.is_active AND b.is_active \
             AND (c.title ILIKE $1 OR c.description ILIKE $1 OR c.code ILIKE $1){} LIMIT $2",
            VIEW_SELECT, VIEW_ORDER
        ))
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(coupons)
    }

    pub async fn availability(&self, id: Uuid) -> Result<Option<CouponAvailability>> {
        let row = sqlx::query_as::<_, (bool, Option<i32>, i32, Option<String>)>(
            "SELECT is_active, usage_limit, used_count, affiliate_url FROM coupons WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(is_active, usage_limit, used_count, affiliate_url)| CouponAvailability {
                is_active,
                usage_limit,
                used_count,
                affiliate_url,
            },
        ))
    }

    /// Conditional increment; `None` when inactive or out of uses
    pub async fn try_increment_usage(&self, id: Uuid) -> Result<Option<i32>> {
        let used_count = sqlx::query_scalar(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1, updated_at = NOW()
            WHERE id = $1
              AND is_active
              AND (usage_limit IS NULL OR used_count < usage_limit)
            RETURNING used_count
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(used_count)
    }
}

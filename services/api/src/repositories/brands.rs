//! Brand repository

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Duplicate, like_pattern, removal, unique_violation};
use crate::catalog::Removal;
use crate::models::{Brand, BrandListQuery, BrandUpdate, NewBrand};

const BRAND_COLUMNS: &str = "id, name, slug, description, logo_url, website_url, \
    is_active, is_sponsored, sponsor_weight, seo_title, seo_description, created_at, updated_at";

#[derive(Clone)]
pub struct BrandRepository {
    pool: PgPool,
}

impl BrandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Postgres>,
        query: &BrandListQuery,
        include_inactive: bool,
    ) {
        builder.push(" WHERE TRUE");
        if !include_inactive {
            builder.push(" AND is_active");
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            builder
                .push(" AND name ILIKE ")
                .push_bind(like_pattern(search));
        }
    }

    pub async fn list(
        &self,
        query: &BrandListQuery,
        include_inactive: bool,
    ) -> Result<(Vec<Brand>, i64)> {
        let page = query.page_params();

        let mut select = QueryBuilder::new(format!("SELECT {} FROM brands", BRAND_COLUMNS));
        Self::push_filters(&mut select, query, include_inactive);
        select
            .push(" ORDER BY name LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let brands = select
            .build_query_as::<Brand>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM brands");
        Self::push_filters(&mut count, query, include_inactive);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((brands, total))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Brand>> {
        let brand = sqlx::query_as::<_, Brand>(&format!(
            "SELECT {} FROM brands WHERE id = $1",
            BRAND_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(brand)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Brand>> {
        debug!("Finding brand by slug: {}", slug);

        let brand = sqlx::query_as::<_, Brand>(&format!(
            "SELECT {} FROM brands WHERE slug = $1 AND is_active",
            BRAND_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(brand)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Brand>> {
        let brand = sqlx::query_as::<_, Brand>(&format!(
            "SELECT {} FROM brands WHERE name = $1",
            BRAND_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(brand)
    }

    pub async fn slug_taken(&self, slug: &str) -> Result<bool> {
        let taken = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM brands WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM brands WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Active sponsored brands, heaviest first
    pub async fn sponsored(&self, limit: i64) -> Result<Vec<Brand>> {
        let brands = sqlx::query_as::<_, Brand>(&format!(
            "SELECT {} FROM brands WHERE is_active AND is_sponsored \
             ORDER BY sponsor_weight DESC, name LIMIT $1",
            BRAND_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(brands)
    }

    /// Fails with [`Duplicate`] when the name or slug is taken
    pub async fn create(&self, brand: &NewBrand) -> Result<Brand> {
        info!("Creating brand: {}", brand.name);

        let result = sqlx::query_as::<_, Brand>(&format!(
            r#"
            INSERT INTO brands
                (name, slug, description, logo_url, website_url, is_active, is_sponsored,
                 sponsor_weight, seo_title, seo_description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            BRAND_COLUMNS
        ))
        .bind(&brand.name)
        .bind(&brand.slug)
        .bind(&brand.description)
        .bind(&brand.logo_url)
        .bind(&brand.website_url)
        .bind(brand.is_active)
        .bind(brand.is_sponsored)
        .bind(brand.sponsor_weight)
        .bind(&brand.seo_title)
        .bind(&brand.seo_description)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(brand) => Ok(brand),
            Err(e) if unique_violation(&e) => Err(Duplicate("Brand").into()),
            Err(e) => Err(e.into()),
        }
    }

    /// `None` when the brand does not exist
    pub async fn update(&self, id: Uuid, update: &BrandUpdate) -> Result<Option<Brand>> {
        let result = sqlx::query_as::<_, Brand>(&format!(
            r#"
            UPDATE brands SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                logo_url = COALESCE($5, logo_url),
                website_url = COALESCE($6, website_url),
                is_active = COALESCE($7, is_active),
                is_sponsored = COALESCE($8, is_sponsored),
                sponsor_weight = COALESCE($9, sponsor_weight),
                seo_title = COALESCE($10, seo_title),
                seo_description = COALESCE($11, seo_description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BRAND_COLUMNS
        ))
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.slug)
        .bind(&update.description)
        .bind(&update.logo_url)
        .bind(&update.website_url)
        .bind(update.is_active)
        .bind(update.is_sponsored)
        .bind(update.sponsor_weight)
        .bind(&update.seo_title)
        .bind(&update.seo_description)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(brand) => Ok(brand),
            Err(e) if unique_violation(&e) => Err(Duplicate("Brand").into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<Brand>> {
        let brands = sqlx::query_as::<_, Brand>(&format!(
            "SELECT {} FROM brands WHERE is_active AND (name ILIKE $1 OR description ILIKE $1) \
             ORDER BY is_sponsored DESC, sponsor_weight DESC, name LIMIT $2",
            BRAND_COLUMNS
        ))
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(brands)
    }

    /// Single statement; the foreign key still guards against a racing insert
    pub async fn delete_if_unused(&self, id: Uuid) -> Result<Removal> {
        let (found, deleted, references) = sqlx::query_as::<_, (bool, bool, i64)>(
            r#"
            WITH refs AS (SELECT COUNT(*) AS n FROM coupons WHERE brand_id = $1),
                 removed AS (
                    DELETE FROM brands WHERE id = $1 AND (SELECT n FROM refs) = 0 RETURNING id
                 )
            SELECT EXISTS(SELECT 1 FROM brands WHERE id = $1),
                   EXISTS(SELECT 1 FROM removed),
                   (SELECT n FROM refs)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(removal(found, deleted, references))
    }
}

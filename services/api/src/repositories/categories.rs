//! Category repository

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{Duplicate, like_pattern, removal, unique_violation};
use crate::catalog::Removal;
use crate::models::{Category, CategorySummary, CategoryUpdate, CreateCategoryRequest};

const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, icon, color, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

impl CategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Categories with their active coupon counts, by name
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<CategorySummary>> {
        let categories = sqlx::query_as::<_, CategorySummary>(
            r#"
            SELECT c.id, c.name, c.slug, c.description, c.icon, c.color, c.is_active,
                   c.created_at, c.updated_at,
                   COUNT(cp.id) FILTER (WHERE cp.is_active) AS coupon_count
            FROM categories c
            LEFT JOIN coupons cp ON cp.category_id = c.id
            WHERE c.is_active OR $1
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "SELECT {} FROM categories WHERE slug = $1 AND is_active",
            CATEGORY_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    pub async fn id_by_slug(&self, slug: &str) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar("SELECT id FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Fails with [`Duplicate`] when the name or slug is taken
    pub async fn create(&self, request: &CreateCategoryRequest, slug: &str) -> Result<Category> {
        info!("Creating category: {}", request.name);

        let result = sqlx::query_as::<_, Category>(&format!(
            r#"
            INSERT INTO categories (name, slug, description, icon, color, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(request.name.trim())
        .bind(slug)
        .bind(&request.description)
        .bind(&request.icon)
        .bind(&request.color)
        .bind(request.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(category) => Ok(category),
            Err(e) if unique_violation(&e) => Err(Duplicate("Category").into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update(&self, id: Uuid, update: &CategoryUpdate) -> Result<Option<Category>> {
        let result = sqlx::query_as::<_, Category>(&format!(
            r#"
            UPDATE categories SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                icon = COALESCE($5, icon),
                color = COALESCE($6, color),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.slug)
        .bind(&update.description)
        .bind(&update.icon)
        .bind(&update.color)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(category) => Ok(category),
            Err(e) if unique_violation(&e) => Err(Duplicate("Category").into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "SELECT {} FROM categories WHERE is_active AND (name ILIKE $1 OR description ILIKE $1) \
             ORDER BY name LIMIT $2",
            CATEGORY_COLUMNS
        ))
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn delete_if_unused(&self, id: Uuid) -> Result<Removal> {
        let (found, deleted, references) = sqlx::query_as::<_, (bool, bool, i64)>(
            r#"
            WITH refs AS (SELECT COUNT(*) AS n FROM coupons WHERE category_id = $1),
                 removed AS (
                    DELETE FROM categories WHERE id = $1 AND (SELECT n FROM refs) = 0
                    RETURNING id
                 )
            SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1),
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

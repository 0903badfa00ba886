//! PostgreSQL repositories
//!
//! One repository per table group, bundled in [`Repositories`], which also
//! backs the workflow store traits.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    catalog::{CatalogStore, Removal},
    models::{
        Brand, Coupon, NewBrand, NewCoupon, NewUsage, Submission, SubmissionListQuery,
        SubmissionStatus, SubmissionType,
    },
    redemption::{CouponAvailability, RedemptionStore},
    submissions::SubmissionStore,
};

pub mod brands;
pub mod categories;
pub mod coupons;
pub mod stats;
pub mod submissions;
pub mod usages;
pub mod users;

pub use brands::BrandRepository;
pub use categories::CategoryRepository;
pub use coupons::CouponRepository;
pub use stats::StatsRepository;
pub use submissions::{ContactRepository, SubmissionRepository};
pub use usages::{FavoriteRepository, UsageRepository};
pub use users::UserRepository;

/// A unique constraint rejected the write
#[derive(Debug, Error)]
#[error("{0} already exists")]
pub struct Duplicate(pub &'static str);

pub(crate) fn unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// `%term%` for ILIKE with the wildcard characters of `term` escaped
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn removal(found: bool, deleted: bool, references: i64) -> Removal {
    match (found, deleted) {
        (_, true) => Removal::Deleted,
        (false, false) => Removal::NotFound,
        (true, false) => Removal::InUse(references),
    }
}

#[derive(Clone)]
pub struct Repositories {
    pub brands: BrandRepository,
    pub categories: CategoryRepository,
    pub coupons: CouponRepository,
    pub usages: UsageRepository,
    pub favorites: FavoriteRepository,
    pub submissions: SubmissionRepository,
    pub contacts: ContactRepository,
    pub users: UserRepository,
    pub stats: StatsRepository,
}

impl Repositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            brands: BrandRepository::new(pool.clone()),
            categories: CategoryRepository::new(pool.clone()),
            coupons: CouponRepository::new(pool.clone()),
            usages: UsageRepository::new(pool.clone()),
            favorites: FavoriteRepository::new(pool.clone()),
            submissions: SubmissionRepository::new(pool.clone()),
            contacts: ContactRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            stats: StatsRepository::new(pool),
        }
    }
}

#[async_trait]
impl SubmissionStore for Repositories {
    async fn insert_submission(
        &self,
        submission_type: SubmissionType,
        payload: &Value,
        user_id: Option<Uuid>,
    ) -> Result<Submission> {
        self.submissions.insert(submission_type, payload, user_id).await
    }

    async fn find_submission(&self, id: Uuid) -> Result<Option<Submission>> {
        self.submissions.find(id).await
    }

    async fn list_submissions(
        &self,
        query: &SubmissionListQuery,
    ) -> Result<(Vec<Submission>, i64)> {
        self.submissions.list(query).await
    }

    async fn update_submission_status(
        &self,
        id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> Result<Option<Submission>> {
        self.submissions.update_status(id, from, to).await
    }

    async fn find_brand_by_name(&self, name: &str) -> Result<Option<Brand>> {
        self.brands.find_by_name(name).await
    }

    async fn brand_slug_taken(&self, slug: &str) -> Result<bool> {
        self.brands.slug_taken(slug).await
    }

    async fn insert_brand(&self, brand: &NewBrand) -> Result<Brand> {
        self.brands.create(brand).await
    }

    async fn brand_exists(&self, id: Uuid) -> Result<bool> {
        self.brands.exists(id).await
    }

    async fn category_exists(&self, id: Uuid) -> Result<bool> {
        self.categories.exists(id).await
    }

    async fn category_id_by_slug(&self, slug: &str) -> Result<Option<Uuid>> {
        self.categories.id_by_slug(slug).await
    }

    async fn insert_coupon(&self, coupon: &NewCoupon) -> Result<Coupon> {
        self.coupons.create(coupon).await
    }
}

#[async_trait]
impl RedemptionStore for Repositories {
    async fn coupon_availability(&self, coupon_id: Uuid) -> Result<Option<CouponAvailability>> {
        self.coupons.availability(coupon_id).await
    }

    async fn try_increment_usage(&self, coupon_id: Uuid) -> Result<Option<i32>> {
        self.coupons.try_increment_usage(coupon_id).await
    }

    async fn insert_usage(&self, usage: &NewUsage) -> Result<()> {
        self.usages.insert(usage).await
    }
}

#[async_trait]
impl CatalogStore for Repositories {
    async fn delete_brand_if_unused(&self, id: Uuid) -> Result<Removal> {
        self.brands.delete_if_unused(id).await
    }

    async fn delete_category_if_unused(&self, id: Uuid) -> Result<Removal> {
        self.categories.delete_if_unused(id).await
    }
}

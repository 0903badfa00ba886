//! Removal of brands and categories while coupons still point at them

use anyhow::Result;
use async_trait::async_trait;
use common::{
    audit::{AuditAction, AuditEvent, AuditLogger, ResourceType},
    http::{ApiError, ApiResult},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::security::Identity;

/// Outcome of a guarded delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    NotFound,
    /// Still referenced by this many coupons
    InUse(i64),
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Delete the brand unless a coupon references it
    async fn delete_brand_if_unused(&self, id: Uuid) -> Result<Removal>;

    /// Delete the category unless a coupon references it
    async fn delete_category_if_unused(&self, id: Uuid) -> Result<Removal>;
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    audit: AuditLogger,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    pub async fn delete_brand(&self, id: Uuid, actor: &Identity) -> ApiResult<()> {
        let removal = self.store.delete_brand_if_unused(id).await?;
        self.finish(removal, id, ResourceType::Brand, actor)
    }

    pub async fn delete_category(&self, id: Uuid, actor: &Identity) -> ApiResult<()> {
        let removal = self.store.delete_category_if_unused(id).await?;
        self.finish(removal, id, ResourceType::Category, actor)
    }

    fn finish(
        &self,
        removal: Removal,
        id: Uuid,
        resource_type: ResourceType,
        actor: &Identity,
    ) -> ApiResult<()> {
        let (label, action) = match resource_type {
            ResourceType::Brand => ("Brand", AuditAction::BrandDeleted),
            _ => ("Category", AuditAction::CategoryDeleted),
        };

        match removal {
            Removal::Deleted => {
                self.audit.record(
                    AuditEvent::new(action, resource_type)
                        .actor(actor.user_id, actor.role)
                        .resource(id)
                        .ip(actor.ip_address.clone()),
                );
                info!("{} {} deleted by {}", label, id, actor.user_id);
                Ok(())
            }
            Removal::NotFound => Err(ApiError::not_found(format!("{} not found", label))),
            Removal::InUse(count) => Err(ApiError::bad_request(format!(
                "{} is still used by {} coupon(s)",
                label, count
            ))),
        }
    }
}

//! Submission moderation and promotion
//!
//! A submission starts PENDING and may be decided once, to APPROVED or
//! REJECTED. Moving promotes its payload into an inactive draft brand or
//! coupon; it works from any status and only changes the status when the
//! request names one.

use anyhow::Result;
use async_trait::async_trait;
use common::{
    audit::{AuditAction, AuditEvent, AuditLogger, ResourceType},
    http::{ApiError, ApiResult, Pagination},
    validation::slugify,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{
        Brand, BrandDraft, Coupon, CouponDraft, CreateSubmissionRequest, NewBrand, NewCoupon,
        Submission, SubmissionAction, SubmissionListQuery, SubmissionPatch, SubmissionStatus,
        SubmissionType,
    },
    repositories::Duplicate,
    security::Identity,
};

/// Give up looking for a free slug after this many suffixes
const MAX_SLUG_SUFFIX: u32 = 1000;

/// Storage needed by the workflow
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(
        &self,
        submission_type: SubmissionType,
        payload: &Value,
        user_id: Option<Uuid>,
    ) -> Result<Submission>;

    async fn find_submission(&self, id: Uuid) -> Result<Option<Submission>>;

    async fn list_submissions(&self, query: &SubmissionListQuery) -> Result<(Vec<Submission>, i64)>;

    /// Set the status only if it is still `from`; `None` when it was not
    async fn update_submission_status(
        &self,
        id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> Result<Option<Submission>>;

    async fn find_brand_by_name(&self, name: &str) -> Result<Option<Brand>>;

    async fn brand_slug_taken(&self, slug: &str) -> Result<bool>;

    async fn insert_brand(&self, brand: &NewBrand) -> Result<Brand>;

    async fn brand_exists(&self, id: Uuid) -> Result<bool>;

    async fn category_exists(&self, id: Uuid) -> Result<bool>;

    async fn category_id_by_slug(&self, slug: &str) -> Result<Option<Uuid>>;

    async fn insert_coupon(&self, coupon: &NewCoupon) -> Result<Coupon>;
}

/// Result of promoting a submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub submission: Submission,
    pub record_type: SubmissionType,
    pub record_id: Uuid,
    /// A brand with the same name already existed and was reused
    pub existed: bool,
    pub status_changed: bool,
}

/// Response to `PATCH /submissions`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PatchOutcome {
    Status(Submission),
    Moved(MoveOutcome),
}

#[derive(Clone)]
pub struct SubmissionWorkflow {
    store: Arc<dyn SubmissionStore>,
    audit: AuditLogger,
    default_category_slug: Option<String>,
}

impl SubmissionWorkflow {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        audit: AuditLogger,
        default_category_slug: Option<String>,
    ) -> Self {
        Self {
            store,
            audit,
            default_category_slug,
        }
    }

    /// Record a new PENDING submission
    pub async fn create(
        &self,
        request: &CreateSubmissionRequest,
        user_id: Option<Uuid>,
    ) -> ApiResult<Submission> {
        let submission = self
            .store
            .insert_submission(request.submission_type, &request.payload, user_id)
            .await?;
        info!(
            "Received {:?} submission {}",
            submission.submission_type, submission.id
        );
        Ok(submission)
    }

    pub async fn list(
        &self,
        query: &SubmissionListQuery,
    ) -> ApiResult<(Vec<Submission>, Pagination)> {
        let (submissions, total) = self.store.list_submissions(query).await?;
        Ok((submissions, query.page_params().pagination(total)))
    }

    pub async fn apply(&self, patch: SubmissionPatch, actor: &Identity) -> ApiResult<PatchOutcome> {
        match patch.action {
            SubmissionAction::Status { status } => self
                .change_status(patch.id, status, actor)
                .await
                .map(PatchOutcome::Status),
            SubmissionAction::Move {
                status,
                category_id,
            } => self
                .move_submission(patch.id, status, category_id, actor)
                .await
                .map(PatchOutcome::Moved),
        }
    }

    /// Decide a pending submission
    pub async fn change_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        actor: &Identity,
    ) -> ApiResult<Submission> {
        let submission = self.find(id).await?;
        let updated = self.transition(&submission, status).await?;

        self.audit.record(
            AuditEvent::new(AuditAction::SubmissionStatusChanged, ResourceType::Submission)
                .actor(actor.user_id, actor.role)
                .resource(id)
                .ip(actor.ip_address.clone())
                .metadata(json!({ "from": submission.status, "to": status })),
        );

        Ok(updated)
    }

    /// Promote a submission into a draft record
    pub async fn move_submission(
        &self,
        id: Uuid,
        status: Option<SubmissionStatus>,
        category_id: Option<Uuid>,
        actor: &Identity,
    ) -> ApiResult<MoveOutcome> {
        let submission = self.find(id).await?;

        if let Some(status) = status {
            ensure_transition(submission.status, status)?;
        }

        let (record_id, existed) = match submission.submission_type {
            SubmissionType::Brand => self.promote_brand(&submission.payload).await?,
            SubmissionType::Coupon => (
                self.promote_coupon(&submission.payload, category_id).await?,
                false,
            ),
        };

        let (submission, status_changed) = match status {
            Some(status) => (self.transition(&submission, status).await?, true),
            None => (submission, false),
        };

        self.audit.record(
            AuditEvent::new(AuditAction::SubmissionMoved, ResourceType::Submission)
                .actor(actor.user_id, actor.role)
                .resource(id)
                .ip(actor.ip_address.clone())
                .metadata(json!({
                    "recordType": submission.submission_type,
                    "recordId": record_id,
                    "existed": existed,
                    "status": status,
                })),
        );

        info!(
            "Moved submission {} into {:?} {}",
            id, submission.submission_type, record_id
        );

        Ok(MoveOutcome {
            record_type: submission.submission_type,
            submission,
            record_id,
            existed,
            status_changed,
        })
    }

    async fn find(&self, id: Uuid) -> ApiResult<Submission> {
        self.store
            .find_submission(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Submission not found"))
    }

    async fn transition(
        &self,
        submission: &Submission,
        status: SubmissionStatus,
    ) -> ApiResult<Submission> {
        ensure_transition(submission.status, status)?;
        self.store
            .update_submission_status(submission.id, submission.status, status)
            .await?
            .ok_or_else(|| ApiError::conflict("Submission was already decided"))
    }

    /// Brand id plus whether it already existed
    async fn promote_brand(&self, payload: &Value) -> ApiResult<(Uuid, bool)> {
        let draft: BrandDraft = parse_payload(payload)?;
        let name = draft
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::invalid_field("payload.name", "Brand name is required"))?;

        if let Some(existing) = self.store.find_brand_by_name(name).await? {
            return Ok((existing.id, true));
        }

        let base = slugify(name);
        if base.is_empty() {
            return Err(ApiError::invalid_field(
                "payload.name",
                "Brand name must contain letters or digits",
            ));
        }
        let slug = self.free_slug(&base).await?;

        let inserted = self
            .store
            .insert_brand(&NewBrand {
                name: name.to_string(),
                slug,
                description: draft.description,
                logo_url: draft.logo_url,
                website_url: draft.website_url,
                is_active: false,
                is_sponsored: false,
                sponsor_weight: 0,
                seo_title: None,
                seo_description: None,
            })
            .await;

        match inserted {
            Ok(brand) => Ok((brand.id, false)),
            // A concurrent move created the same name between lookup and insert
            Err(e) if e.is::<Duplicate>() => match self.store.find_brand_by_name(name).await? {
                Some(existing) => Ok((existing.id, true)),
                None => Err(ApiError::conflict("Brand slug was taken concurrently, retry")),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn free_slug(&self, base: &str) -> ApiResult<String> {
        if !self.store.brand_slug_taken(base).await? {
            return Ok(base.to_string());
        }
        for suffix in 2..=MAX_SLUG_SUFFIX {
            let candidate = format!("{}-{}", base, suffix);
            if !self.store.brand_slug_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(ApiError::conflict("No free slug for this brand name"))
    }

    async fn promote_coupon(&self, payload: &Value, category_id: Option<Uuid>) -> ApiResult<Uuid> {
        let draft: CouponDraft = parse_payload(payload)?;
        let title = draft
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| ApiError::invalid_field("payload.title", "Coupon title is required"))?;

        let brand_id = draft
            .brand_id
            .ok_or_else(|| ApiError::invalid_field("payload.brandId", "Brand is required"))?;
        if !self.store.brand_exists(brand_id).await? {
            return Err(ApiError::invalid_field("payload.brandId", "Brand not found"));
        }

        let category_id = self.resolve_category(draft.category_id.or(category_id)).await?;

        let coupon = self
            .store
            .insert_coupon(&NewCoupon {
                title: title.to_string(),
                description: draft.description,
                code: draft.code,
                coupon_type: draft.coupon_type.unwrap_or_default(),
                discount_type: draft.discount_type.unwrap_or_default(),
                discount_value: draft.discount_value.unwrap_or(0.0),
                min_order_value: None,
                max_discount: None,
                usage_limit: None,
                valid_from: None,
                valid_until: draft.valid_until,
                affiliate_url: draft.affiliate_url,
                is_active: false,
                is_verified: false,
                is_exclusive: false,
                is_sponsored: false,
                sponsor_weight: 0,
                brand_id,
                category_id,
            })
            .await?;
        Ok(coupon.id)
    }

    /// Named category, else the configured default, else a validation error
    async fn resolve_category(&self, requested: Option<Uuid>) -> ApiResult<Uuid> {
        if let Some(id) = requested {
            if self.store.category_exists(id).await? {
                return Ok(id);
            }
            return Err(ApiError::invalid_field("categoryId", "Category not found"));
        }

        if let Some(slug) = &self.default_category_slug {
            if let Some(id) = self.store.category_id_by_slug(slug).await? {
                return Ok(id);
            }
        }

        Err(ApiError::invalid_field(
            "categoryId",
            "A category is required to move this coupon",
        ))
    }
}

fn ensure_transition(from: SubmissionStatus, to: SubmissionStatus) -> ApiResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ApiError::conflict(format!(
            "Cannot change submission status from {:?} to {:?}",
            from, to
        )))
    }
}

fn parse_payload<T: DeserializeOwned>(payload: &Value) -> ApiResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| ApiError::invalid_field("payload", format!("Invalid payload: {}", e)))
}

//! Coupon catalog and redemption

use axum::{
    Router,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post, put},
};
use common::{
    audit::{AuditAction, ResourceType},
    http::{ApiError, ApiResponse, ApiResult, ValidatedJson, ValidatedQuery, client_info},
};
use tracing::info;
use uuid::Uuid;

use super::{audited, include_inactive};
use crate::{
    models::{
        CouponListQuery, CouponUpdate, CreateCouponRequest, DiscountType, NewCoupon,
        SponsoredQuery,
    },
    security::{Identity, Policy, protect},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let rules = &state.settings.rate_limits;

    let public = Router::new()
        .route("/coupons", get(list_coupons))
        .route("/coupons/sponsored", get(sponsored_coupons))
        .route("/coupons/:id", get(coupon_by_id));

    let redeem = Router::new().route("/coupons/:id/use", post(use_coupon));

    let admin = Router::new()
        .route("/coupons/create", post(create_coupon))
        .route("/coupons/:id", put(update_coupon).delete(delete_coupon));

    protect(public, state, Policy::PUBLIC)
        .merge(protect(
            redeem,
            state,
            Policy::PUBLIC.rate_limited(rules.coupon_use),
        ))
        .merge(protect(
            admin,
            state,
            Policy::ADMIN.with_csrf().rate_limited(rules.admin_mutations),
        ))
}

async fn list_coupons(
    State(state): State<AppState>,
    identity: Option<Identity>,
    ValidatedQuery(query): ValidatedQuery<CouponListQuery>,
) -> ApiResult<impl IntoResponse> {
    let include_inactive = include_inactive(query.include_inactive, identity.as_ref());
    let (coupons, total) = state.repos.coupons.list(&query, include_inactive).await?;
    Ok(ApiResponse::paginated(
        coupons,
        query.page_params().pagination(total),
    ))
}

async fn sponsored_coupons(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<SponsoredQuery>,
) -> ApiResult<impl IntoResponse> {
    let coupons = state.repos.coupons.sponsored(query.limit()).await?;
    Ok(ApiResponse::ok(coupons))
}

/// Inactive coupons are only visible to administrators
async fn coupon_by_id(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let is_admin = identity.is_some_and(|identity| identity.role.is_admin());
    let coupon = state
        .repos
        .coupons
        .find_view(id)
        .await?
        .filter(|view| view.coupon.is_active || is_admin)
        .ok_or_else(|| ApiError::not_found("Coupon not found"))?;
    Ok(ApiResponse::ok(coupon))
}

async fn use_coupon(
    State(state): State<AppState>,
    identity: Option<Identity>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user_id = identity.map(|identity| identity.user_id);
    let (redemption, _) = state
        .redemptions
        .redeem(id, user_id, client_info(&headers))
        .await?;
    Ok(ApiResponse::ok(redemption))
}

async fn check_references(
    state: &AppState,
    brand_id: Option<Uuid>,
    category_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(brand_id) = brand_id {
        if !state.repos.brands.exists(brand_id).await? {
            return Err(ApiError::invalid_field("brandId", "Brand does not exist"));
        }
    }
    if let Some(category_id) = category_id {
        if !state.repos.categories.exists(category_id).await? {
            return Err(ApiError::invalid_field(
                "categoryId",
                "Category does not exist",
            ));
        }
    }
    Ok(())
}

async fn create_coupon(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<CreateCouponRequest>,
) -> ApiResult<impl IntoResponse> {
    check_references(&state, Some(request.brand_id), Some(request.category_id)).await?;

    let coupon = state.repos.coupons.create(&NewCoupon::from(request)).await?;

    state.audit.record(
        audited(&identity, AuditAction::CouponCreated, ResourceType::Coupon, coupon.id)
            .metadata(serde_json::json!({ "title": coupon.title, "brandId": coupon.brand_id })),
    );
    info!("Coupon {} created by {}", coupon.id, identity.user_id);
    Ok(ApiResponse::created(coupon).with_message("Coupon created"))
}

/// Partial update; the discount and date rules are checked against the
/// merged result, not only the fields sent
async fn update_coupon(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    ValidatedJson(update): ValidatedJson<CouponUpdate>,
) -> ApiResult<impl IntoResponse> {
    let current = state
        .repos
        .coupons
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Coupon not found"))?;

    let discount_type = update.discount_type.unwrap_or(current.discount_type);
    let discount_value = update.discount_value.unwrap_or(current.discount_value);
    if discount_type == DiscountType::Percentage && discount_value > 100.0 {
        return Err(ApiError::invalid_field(
            "discountValue",
            "Percentage discounts cannot exceed 100",
        ));
    }

    let valid_from = update.valid_from.or(current.valid_from);
    let valid_until = update.valid_until.or(current.valid_until);
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if until <= from {
            return Err(ApiError::invalid_field(
                "validUntil",
                "validUntil must be after validFrom",
            ));
        }
    }

    check_references(&state, update.brand_id, update.category_id).await?;

    let coupon = state
        .repos
        .coupons
        .update(id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Coupon not found"))?;

    state.audit.record(
        audited(&identity, AuditAction::CouponUpdated, ResourceType::Coupon, coupon.id)
            .metadata(serde_json::json!({ "isActive": coupon.is_active })),
    );
    Ok(ApiResponse::ok(coupon).with_message("Coupon updated"))
}

async fn delete_coupon(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repos.coupons.delete(id).await? {
        return Err(ApiError::not_found("Coupon not found"));
    }

    state
        .audit
        .record(audited(&identity, AuditAction::CouponDeleted, ResourceType::Coupon, id));
    info!("Coupon {} deleted by {}", id, identity.user_id);
    Ok(ApiResponse::message("Coupon deleted"))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestContext, body_json, send, settle};
    use axum::http::{Method, StatusCode};
    use common::auth::Role;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_use_coupon_counts_and_returns_link() {
        let ctx = TestContext::new();
        let coupon = ctx.store.add_coupon_with(true, Some(2)).await;
        let path = format!("/coupons/{}/use", coupon);

        let response = send(&ctx, Method::POST, &path, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["recorded"], true);
        assert_eq!(json["data"]["usedCount"], 1);
        assert_eq!(ctx.store.used_count(coupon).await, Some(1));
    }

    #[tokio::test]
    async fn test_use_coupon_attributes_signed_in_user() {
        let ctx = TestContext::new();
        let user = ctx.sign_in(Role::User).await;
        let coupon = ctx.store.add_coupon_with(true, None).await;
        let path = format!("/coupons/{}/use", coupon);

        let response = send(&ctx, Method::POST, &path, Some(&user), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        settle().await;
        let usages = ctx.store.usages().await;
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].user_id, Some(user.user_id));
    }

    #[tokio::test]
    async fn test_use_coupon_failures() {
        let ctx = TestContext::new();
        let inactive = ctx.store.add_coupon_with(false, None).await;
        let exhausted = ctx.store.add_coupon_with(true, Some(0)).await;

        let path = format!("/coupons/{}/use", Uuid::new_v4());
        let response = send(&ctx, Method::POST, &path, None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let path = format!("/coupons/{}/use", inactive);
        let response = send(&ctx, Method::POST, &path, None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let path = format!("/coupons/{}/use", exhausted);
        let response = send(&ctx, Method::POST, &path, None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_storage_failure_still_answers_ok() {
        let ctx = TestContext::new();
        let coupon = ctx.store.add_coupon_with(true, None).await;
        ctx.store.fail_redemptions(true).await;

        let path = format!("/coupons/{}/use", coupon);
        let response = send(&ctx, Method::POST, &path, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"], serde_json::json!({ "recorded": false }));
    }

    #[tokio::test]
    async fn test_use_coupon_is_rate_limited() {
        let ctx = TestContext::new();
        let coupon = ctx.store.add_coupon_with(true, None).await;
        let path = format!("/coupons/{}/use", coupon);
        let allowed = ctx.state.settings.rate_limits.coupon_use.max_requests;

        for _ in 0..allowed {
            let response = send(&ctx, Method::POST, &path, None, None).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = send(&ctx, Method::POST, &path, None, None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ctx.store.used_count(coupon).await, Some(allowed as i32));
    }

    #[tokio::test]
    async fn test_percentage_over_100_is_rejected() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;
        let body = serde_json::json!({
            "title": "Half off everything",
            "discountType": "PERCENTAGE",
            "discountValue": 150,
            "brandId": Uuid::new_v4(),
            "categoryId": Uuid::new_v4(),
        });

        let response = send(&ctx, Method::POST, "/coupons/create", Some(&admin), Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["errors"].is_object());
    }
}

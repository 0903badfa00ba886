//! Brand catalog

use axum::{
    Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
};
use common::{
    audit::{AuditAction, ResourceType},
    http::{ApiError, ApiResponse, ApiResult, ValidatedJson, ValidatedQuery},
};
use tracing::info;
use uuid::Uuid;

use super::{audited, duplicate_as_conflict, include_inactive, slug_for};
use crate::{
    models::{BrandListQuery, BrandUpdate, CreateBrandRequest, NewBrand, SponsoredQuery},
    security::{Identity, Policy, protect},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/brands", get(list_brands))
        .route("/brands/sponsored", get(sponsored_brands))
        .route("/brands/slug/:slug", get(brand_by_slug));

    let admin = Router::new()
        .route("/brands", post(create_brand))
        .route("/brands/:id", put(update_brand).delete(delete_brand));

    protect(public, state, Policy::PUBLIC).merge(protect(
        admin,
        state,
        Policy::ADMIN
            .with_csrf()
            .rate_limited(state.settings.rate_limits.admin_mutations),
    ))
}

async fn list_brands(
    State(state): State<AppState>,
    identity: Option<Identity>,
    ValidatedQuery(query): ValidatedQuery<BrandListQuery>,
) -> ApiResult<impl IntoResponse> {
    let include_inactive = include_inactive(query.include_inactive, identity.as_ref());
    let (brands, total) = state.repos.brands.list(&query, include_inactive).await?;
    Ok(ApiResponse::paginated(
        brands,
        query.page_params().pagination(total),
    ))
}

async fn sponsored_brands(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<SponsoredQuery>,
) -> ApiResult<impl IntoResponse> {
    let brands = state.repos.brands.sponsored(query.limit()).await?;
    Ok(ApiResponse::ok(brands))
}

async fn brand_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let brand = state
        .repos
        .brands
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Brand not found"))?;
    Ok(ApiResponse::ok(brand))
}

async fn create_brand(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<CreateBrandRequest>,
) -> ApiResult<impl IntoResponse> {
    let slug = slug_for(request.slug.as_deref(), &request.name)?;
    let brand = state
        .repos
        .brands
        .create(&NewBrand::from_request(request, slug))
        .await
        .map_err(duplicate_as_conflict)?;

    state.audit.record(
        audited(&identity, AuditAction::BrandCreated, ResourceType::Brand, brand.id)
            .metadata(serde_json::json!({ "name": brand.name, "slug": brand.slug })),
    );
    info!("Brand {} created by {}", brand.id, identity.user_id);
    Ok(ApiResponse::created(brand).with_message("Brand created"))
}

async fn update_brand(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    ValidatedJson(update): ValidatedJson<BrandUpdate>,
) -> ApiResult<impl IntoResponse> {
    let brand = state
        .repos
        .brands
        .update(id, &update)
        .await
        .map_err(duplicate_as_conflict)?
        .ok_or_else(|| ApiError::not_found("Brand not found"))?;

    state.audit.record(
        audited(&identity, AuditAction::BrandUpdated, ResourceType::Brand, brand.id)
            .metadata(serde_json::json!({ "isActive": brand.is_active })),
    );
    Ok(ApiResponse::ok(brand).with_message("Brand updated"))
}

async fn delete_brand(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.catalog.delete_brand(id, &identity).await?;
    Ok(ApiResponse::message("Brand deleted"))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestContext, body_json, build_request, dispatch, send};
    use axum::http::{Method, StatusCode};
    use common::auth::Role;

    #[tokio::test]
    async fn test_brand_mutations_need_admin_and_csrf() {
        let ctx = TestContext::new();
        let user = ctx.sign_in(Role::User).await;
        let admin = ctx.sign_in(Role::Admin).await;
        let body = serde_json::json!({ "name": "Acme" });

        let response = send(&ctx, Method::POST, "/brands", None, Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&ctx, Method::POST, "/brands", Some(&user), Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = build_request(Method::POST, "/brands", Some(&admin), false, Some(body));
        let response = dispatch(&ctx, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["message"], "Invalid CSRF token");
    }

    #[tokio::test]
    async fn test_delete_brand_in_use_is_rejected() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;
        let brand = ctx.store.add_brand("Acme", "acme").await;
        let category = ctx.store.add_category("Shoes", "shoes").await;
        ctx.store.add_coupon_in(brand, category).await;

        let path = format!("/brands/{}", brand);
        let response = send(&ctx, Method::DELETE, &path, Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Brand is still used by 1 coupon(s)"
        );
        assert_eq!(ctx.store.brand_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_brand_body_is_rejected_before_storage() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;

        let body = serde_json::json!({ "name": "   ", "sponsorWeight": 5000 });
        let response = send(&ctx, Method::POST, "/brands", Some(&admin), Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["errors"]["name"].is_array());
        assert_eq!(json["errors"].as_object().unwrap().len(), 2);
    }
}

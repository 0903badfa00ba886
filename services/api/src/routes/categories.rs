//! Category catalog

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
    models::{CategoryListQuery, CategoryUpdate, CreateCategoryRequest},
    security::{Identity, Policy, protect},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/slug/:slug", get(category_by_slug));

    let admin = Router::new()
        .route("/categories", post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category));

    protect(public, state, Policy::PUBLIC).merge(protect(
        admin,
        state,
        Policy::ADMIN
            .with_csrf()
            .rate_limited(state.settings.rate_limits.admin_mutations),
    ))
}

/// Categories with their active coupon counts
async fn list_categories(
    State(state): State<AppState>,
    identity: Option<Identity>,
    ValidatedQuery(query): ValidatedQuery<CategoryListQuery>,
) -> ApiResult<impl IntoResponse> {
    let include_inactive = include_inactive(query.include_inactive, identity.as_ref());
    let categories = state.repos.categories.list(include_inactive).await?;
    Ok(ApiResponse::ok(categories))
}

async fn category_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let category = state
        .repos
        .categories
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(ApiResponse::ok(category))
}

async fn create_category(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let slug = slug_for(request.slug.as_deref(), &request.name)?;
    let category = state
        .repos
        .categories
        .create(&request, &slug)
        .await
        .map_err(duplicate_as_conflict)?;

    state.audit.record(
        audited(
            &identity,
            AuditAction::CategoryCreated,
            ResourceType::Category,
            category.id,
        )
        .metadata(serde_json::json!({ "name": category.name, "slug": category.slug })),
    );
    info!("Category {} created by {}", category.id, identity.user_id);
    Ok(ApiResponse::created(category).with_message("Category created"))
}

async fn update_category(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    ValidatedJson(update): ValidatedJson<CategoryUpdate>,
) -> ApiResult<impl IntoResponse> {
    let category = state
        .repos
        .categories
        .update(id, &update)
        .await
        .map_err(duplicate_as_conflict)?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    state.audit.record(
        audited(
            &identity,
            AuditAction::CategoryUpdated,
            ResourceType::Category,
            category.id,
        )
        .metadata(serde_json::json!({ "isActive": category.is_active })),
    );
    Ok(ApiResponse::ok(category).with_message("Category updated"))
}

async fn delete_category(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.catalog.delete_category(id, &identity).await?;
    Ok(ApiResponse::message("Category deleted"))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestContext, body_json, send, settle};
    use axum::http::{Method, StatusCode};
    use common::auth::Role;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_delete_category_in_use_is_rejected() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;
        let brand = ctx.store.add_brand("Acme", "acme").await;
        let category = ctx.store.add_category("Shoes", "shoes").await;
        ctx.store.add_coupon_in(brand, category).await;

        let path = format!("/categories/{}", category);
        let response = send(&ctx, Method::DELETE, &path, Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Category is still used by 1 coupon(s)"
        );
    }

    #[tokio::test]
    async fn test_delete_unused_category_is_audited() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;
        let category = ctx.store.add_category("Travel", "travel").await;

        let path = format!("/categories/{}", category);
        let response = send(&ctx, Method::DELETE, &path, Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Category deleted");

        settle().await;
        let entries = ctx.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "CATEGORY_DELETED");
        assert_eq!(entries[0].actor_id, Some(admin.user_id));
        assert_eq!(entries[0].resource_id, Some(category.to_string()));
    }

    #[tokio::test]
    async fn test_delete_missing_category_is_not_found() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;

        let path = format!("/categories/{}", Uuid::new_v4());
        let response = send(&ctx, Method::DELETE, &path, Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_color_is_rejected() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;

        let body = serde_json::json!({ "name": "Food", "color": "red" });
        let response = send(&ctx, Method::POST, "/categories", Some(&admin), Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["errors"]["color"].is_array());
    }
}

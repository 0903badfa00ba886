//! The signed-in user's own account area

use axum::{
    Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
};
use common::{
    audit::{AuditAction, ResourceType},
    http::{ApiError, ApiResponse, ApiResult, ValidatedJson, ValidatedQuery},
    password::{hash_password, verify_password},
};
use serde_json::json;
use tracing::info;

use super::{audited, duplicate_as_conflict};
use crate::{
    models::{
        ChangePasswordRequest, FavoriteRequest, SettingsPatch, UpdateProfileRequest, UserStats,
    },
    security::{Identity, Policy, protect},
    state::AppState,
};

/// Favorites are personal and must not be cached by shared caches
const PRIVATE_NO_STORE: [(header::HeaderName, &str); 1] =
    [(header::CACHE_CONTROL, "private, no-store")];

const RECENT_USAGES: i64 = 5;

pub fn router(state: &AppState) -> Router<AppState> {
    let read = Router::new()
        .route("/user/profile", get(profile))
        .route("/user/settings", get(settings))
        .route("/user/favorites", get(list_favorites))
        .route("/user/stats", get(stats));

    let write = Router::new()
        .route("/user/profile", put(update_profile))
        .route("/user/settings", put(update_settings).patch(update_settings))
        .route("/user/change-password", post(change_password))
        .route("/user/favorites", post(add_favorite).delete(remove_favorite));

    protect(read, state, Policy::AUTHENTICATED).merge(protect(
        write,
        state,
        Policy::AUTHENTICATED
            .with_csrf()
            .rate_limited(state.settings.rate_limits.user_mutations),
    ))
}

async fn profile(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<impl IntoResponse> {
    let profile = state
        .repos
        .users
        .find_profile(identity.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = request.name.as_deref().map(str::trim);
    let email = request.email.as_deref().map(|email| email.trim().to_lowercase());

    let profile = state
        .repos
        .users
        .update_profile(identity.user_id, name, email.as_deref())
        .await
        .map_err(duplicate_as_conflict)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(profile).with_message("Profile updated"))
}

async fn settings(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<impl IntoResponse> {
    let settings = state
        .repos
        .users
        .settings(identity.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(settings))
}

/// Shallow merge: top-level keys in the patch replace stored ones
async fn update_settings(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(patch): ValidatedJson<SettingsPatch>,
) -> ApiResult<impl IntoResponse> {
    let settings = state
        .repos
        .users
        .merge_settings(identity.user_id, &patch.settings)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(settings).with_message("Settings updated"))
}

/// Other sessions of the account stay signed in
async fn change_password(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let current_hash = state
        .repos
        .users
        .password_hash(identity.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(&request.current_password, &current_hash)? {
        return Err(ApiError::invalid_field(
            "currentPassword",
            "Current password is incorrect",
        ));
    }
    if request.current_password == request.new_password {
        return Err(ApiError::invalid_field(
            "newPassword",
            "New password must differ from the current one",
        ));
    }

    let new_hash = hash_password(&request.new_password)?;
    state
        .repos
        .users
        .update_password(identity.user_id, &new_hash)
        .await?;

    state.audit.record(audited(
        &identity,
        AuditAction::PasswordChanged,
        ResourceType::User,
        identity.user_id,
    ));
    info!("User {} changed their password", identity.user_id);
    Ok(ApiResponse::message("Password changed"))
}

async fn list_favorites(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<impl IntoResponse> {
    let favorites = state.repos.favorites.list(identity.user_id).await?;
    Ok((PRIVATE_NO_STORE, ApiResponse::ok(favorites)))
}

async fn add_favorite(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<FavoriteRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.repos.coupons.exists(request.coupon_id).await? {
        return Err(ApiError::not_found("Coupon not found"));
    }

    let added = state
        .repos
        .favorites
        .add(identity.user_id, request.coupon_id)
        .await?;
    let message = if added {
        "Added to favorites"
    } else {
        "Already in favorites"
    };
    let body = json!({ "couponId": request.coupon_id, "favorited": true });
    Ok((PRIVATE_NO_STORE, ApiResponse::ok(body).with_message(message)))
}

/// `DELETE /user/favorites?couponId=`
async fn remove_favorite(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedQuery(request): ValidatedQuery<FavoriteRequest>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .repos
        .favorites
        .remove(identity.user_id, request.coupon_id)
        .await?;
    if !removed {
        return Err(ApiError::not_found("Coupon is not in favorites"));
    }
    let body = json!({ "couponId": request.coupon_id, "favorited": false });
    Ok((
        PRIVATE_NO_STORE,
        ApiResponse::ok(body).with_message("Removed from favorites"),
    ))
}

async fn stats(State(state): State<AppState>, identity: Identity) -> ApiResult<impl IntoResponse> {
    let repos = &state.repos;
    let (favorite_count, usage_count, recent_usages) = tokio::try_join!(
        repos.favorites.count(identity.user_id),
        repos.usages.count_for_user(identity.user_id),
        repos.usages.recent_for_user(identity.user_id, RECENT_USAGES),
    )?;

    Ok(ApiResponse::ok(UserStats {
        favorite_count,
        usage_count,
        recent_usages,
    }))
}

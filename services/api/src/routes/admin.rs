//! Back-office: statistics, security, sessions and accounts

use axum::{
    Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use common::{
    audit::{AuditAction, AuditFilter, AuditQuery, ResourceType},
    auth::Role,
    http::{ApiError, ApiResponse, ApiResult, ValidatedJson, ValidatedQuery},
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::audited;
use crate::{
    models::{
        AdminUserPatch, AdminUserQuery, AnalyticsQuery, ForceLogoutRequest, SessionQuery,
        UsageAnalytics, UsageQuery,
    },
    security::{Identity, Policy, protect},
    state::AppState,
};

/// Security events shown on the dashboard
const RECENT_SECURITY_EVENTS: u32 = 20;

pub fn router(state: &AppState) -> Router<AppState> {
    let read = Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/usage-analytics", get(usage_analytics))
        .route("/admin/security-dashboard", get(security_dashboard))
        .route("/admin/sessions", get(sessions))
        .route("/admin/users", get(list_users))
        .route("/admin/audit-logs", get(audit_logs))
        .route("/admin/coupon-usages", get(coupon_usages));

    let write = Router::new()
        .route("/admin/sessions", post(force_logout))
        .route("/admin/sessions/lockout/:user_id", delete(clear_lockout))
        .route("/admin/users", patch(update_user));

    protect(read, state, Policy::ADMIN).merge(protect(
        write,
        state,
        Policy::ADMIN
            .with_csrf()
            .rate_limited(state.settings.rate_limits.admin_mutations),
    ))
}

async fn stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state.repos.stats.admin_stats().await?;
    Ok(ApiResponse::ok(stats))
}

/// Daily redemptions and the most used coupons over the last `days`
async fn usage_analytics(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<AnalyticsQuery>,
) -> ApiResult<impl IntoResponse> {
    let days = query.days();
    let (daily, top_coupons) = tokio::try_join!(
        state.repos.stats.daily_usage(days),
        state.repos.stats.top_coupons(days),
    )?;
    Ok(ApiResponse::ok(UsageAnalytics {
        days,
        daily,
        top_coupons,
    }))
}

async fn security_dashboard(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sessions = state.sessions.stats().await?;
    let recent = state
        .audit
        .query(&AuditFilter {
            limit: RECENT_SECURITY_EVENTS,
            actions: AuditAction::SECURITY.to_vec(),
            ..AuditFilter::default()
        })
        .await?;

    Ok(ApiResponse::ok(json!({
        "sessions": sessions,
        "rateLimiter": {
            "trackedKeys": state.rate_limiter.tracked_keys().await,
            "bannedKeys": state.rate_limiter.banned_keys().await,
        },
        "lockoutPolicy": {
            "maxAttempts": state.settings.lockout.max_attempts,
            "lockoutSeconds": state.settings.lockout.lockout_seconds,
        },
        "recentEvents": recent.entries,
    })))
}

/// One user's sessions with `?userId=`, otherwise the global numbers
async fn sessions(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<SessionQuery>,
) -> ApiResult<impl IntoResponse> {
    let body = match query.user_id {
        Some(user_id) => serde_json::to_value(state.sessions.session_info(user_id).await?),
        None => serde_json::to_value(state.sessions.stats().await?),
    }
    .map_err(anyhow::Error::from)?;
    Ok(ApiResponse::ok(body))
}

/// End every session of a user
async fn force_logout(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<ForceLogoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let revoked = state.sessions.force_logout_user(request.user_id).await?;

    state.audit.record(
        audited(
            &identity,
            AuditAction::ForceLogout,
            ResourceType::Session,
            request.user_id,
        )
        .metadata(json!({ "reason": request.reason, "revokedSessions": revoked })),
    );
    warn!(
        "User {} forced logout of {} ({} sessions)",
        identity.user_id, request.user_id, revoked
    );

    Ok(ApiResponse::ok(json!({
        "userId": request.user_id,
        "revokedSessions": revoked,
    }))
    .with_message("User logged out everywhere"))
}

async fn clear_lockout(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let cleared = state.sessions.clear_lockout(user_id).await?;

    state.audit.record(
        audited(&identity, AuditAction::LockoutCleared, ResourceType::User, user_id)
            .metadata(json!({ "wasLocked": cleared })),
    );

    let message = if cleared {
        "Lockout cleared"
    } else {
        "User was not locked out"
    };
    Ok(ApiResponse::ok(json!({ "userId": user_id, "cleared": cleared })).with_message(message))
}

async fn list_users(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<AdminUserQuery>,
) -> ApiResult<impl IntoResponse> {
    let (users, total) = state.repos.users.list(&query).await?;
    Ok(ApiResponse::paginated(
        users,
        query.page_params().pagination(total),
    ))
}

/// Activate, deactivate or change the role of an account.
///
/// Granting or revoking an administrator role, and touching another
/// administrator's account, is reserved to SUPER_ADMIN. A deactivation or
/// role change ends the account's sessions so stale roles do not linger.
async fn update_user(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(patch): ValidatedJson<AdminUserPatch>,
) -> ApiResult<impl IntoResponse> {
    let target = state
        .repos
        .users
        .find_profile(patch.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    check_account_change(&identity, target.role, &patch)?;

    let updated = state
        .repos
        .users
        .admin_update(target.id, patch.is_active, patch.role)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let deactivated = target.is_active && !updated.is_active;
    let role_changed = target.role != updated.role;
    let revoked = if deactivated || role_changed {
        state.sessions.force_logout_user(updated.id).await?
    } else {
        0
    };

    state.audit.record(
        audited(&identity, AuditAction::UserUpdated, ResourceType::User, updated.id).metadata(
            json!({
                "previousRole": target.role,
                "role": updated.role,
                "wasActive": target.is_active,
                "isActive": updated.is_active,
                "revokedSessions": revoked,
            }),
        ),
    );
    info!(
        "User {} updated account {} (active={}, role={})",
        identity.user_id, updated.id, updated.is_active, updated.role
    );

    Ok(ApiResponse::ok(updated).with_message("User updated"))
}

fn check_account_change(
    actor: &Identity,
    target_role: Role,
    patch: &AdminUserPatch,
) -> ApiResult<()> {
    let is_self = actor.user_id == patch.user_id;

    if is_self && patch.is_active == Some(false) {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }
    if is_self && patch.role.is_some_and(|role| role != actor.role) {
        return Err(ApiError::bad_request("You cannot change your own role"));
    }
    if is_self {
        return Ok(());
    }

    if actor.role != Role::SuperAdmin {
        let grants_admin = patch.role.is_some_and(Role::is_admin);
        if grants_admin || target_role.is_admin() {
            return Err(ApiError::forbidden(
                "Only a super administrator can manage administrator accounts",
            ));
        }
    }
    Ok(())
}

async fn audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = AuditFilter::try_from(query)?;
    let page = state.audit.query(&filter).await?;
    Ok(ApiResponse::paginated(page.entries, page.pagination))
}

async fn coupon_usages(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<UsageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (usages, total) = state.repos.usages.list(&query).await?;
    Ok(ApiResponse::paginated(
        usages,
        query.page_params().pagination(total),
    ))
}

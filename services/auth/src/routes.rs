//! Authentication service routes

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use common::{
    audit::{AuditAction, AuditEvent, ResourceType},
    auth::TokenType,
    http::{ApiError, ApiResponse, ApiResult, ValidatedJson, client_info, client_ip},
    password::{hash_password, verify_password},
    rate_limit::{RateDecision, RateLimiter},
    session::LoginAttempt,
    settings::RateLimitRule,
    validation::validate_password_strength,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::{
    models::{NewUser, UserProfile},
    repositories::DuplicateEmail,
    reset,
    state::AppState,
};

/// Login attempts allowed per address before a ban
pub const LOGIN_RULE: RateLimitRule = RateLimitRule::new(10, 300);

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetConfirmRequest {
    #[validate(length(equal = 48, message = "Invalid reset token"))]
    pub token: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
}

/// Response for token generation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Response for user login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    /// Echo in `X-CSRF-Token` on every state-changing request
    pub csrf_token: String,
    pub user: UserProfile,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .route("/auth/password/reset/request", post(request_password_reset))
        .route("/auth/password/reset/confirm", post(confirm_password_reset))
        .with_state(state)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn throttle(limiter: &RateLimiter, key: String, rule: RateLimitRule) -> ApiResult<()> {
    match limiter.check(&key, rule).await {
        RateDecision::Allowed { .. } => Ok(()),
        decision => {
            warn!("Rate limit exceeded for {}", key);
            Err(ApiError::RateLimited {
                retry_after: decision.retry_after_secs(),
            })
        }
    }
}

fn ip_key(prefix: &str, ip: Option<&str>) -> String {
    format!("{}:ip:{}", prefix, ip.unwrap_or("unknown"))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.sessions.health_check().await.unwrap_or(false);
    Json(serde_json::json!({
        "status": if cache { "ok" } else { "degraded" },
        "service": "auth-service"
    }))
}

/// Create an account
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = client_ip(&headers);
    throttle(
        &state.rate_limiter,
        ip_key("register", ip.as_deref()),
        state.settings.rate_limits.registration,
    )
    .await?;

    let email = normalize_email(&payload.email);
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let new_user = NewUser {
        email,
        name: payload.name.map(|name| name.trim().to_string()),
        password_hash: hash_password(&payload.password)?,
    };

    let user = match state.users.create_user(&new_user).await {
        Ok(user) => user,
        Err(e) if e.is::<DuplicateEmail>() => {
            return Err(ApiError::conflict("An account with this email already exists"));
        }
        Err(e) => return Err(e.into()),
    };

    info!("Registered user {}", user.id);
    Ok(ApiResponse::created(UserProfile::from(&user)).with_message("Account created"))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let client = client_info(&headers);
    throttle(
        &state.login_limiter,
        ip_key("login", client.ip_address.as_deref()),
        LOGIN_RULE,
    )
    .await?;

    let email = normalize_email(&payload.email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        info!("Login attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if let Some(until) = state.sessions.lock_status(user.id).await? {
        return Err(locked(until));
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        let attempt = state.sessions.record_failed_login(user.id).await?;
        state.audit.record(
            AuditEvent::new(AuditAction::LoginFailed, ResourceType::User)
                .resource(user.id)
                .ip(client.ip_address.clone()),
        );

        return Err(match attempt {
            LoginAttempt::Recorded { .. } => ApiError::InvalidCredentials,
            LoginAttempt::Locked {
                until,
                newly_locked,
            } => {
                if newly_locked {
                    state.audit.record(
                        AuditEvent::new(AuditAction::AccountLocked, ResourceType::User)
                            .resource(user.id)
                            .ip(client.ip_address.clone())
                            .metadata(serde_json::json!({ "lockedUntil": until })),
                    );
                }
                locked(until)
            }
        });
    }

    if !user.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    state.sessions.record_successful_login(user.id).await?;
    let session = state
        .sessions
        .create_session(user.id, user.role, client)
        .await?;
    let pair = state
        .jwt_service
        .generate_pair(user.id, user.role, session.id)?;

    info!("User {} logged in with session {}", user.id, session.id);
    Ok(ApiResponse::ok(LoginResponse {
        tokens: TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: state.jwt_service.access_token_expiry(),
        },
        csrf_token: session.csrf_token,
        user: UserProfile::from(&user),
    }))
}

fn locked(until: chrono::DateTime<chrono::Utc>) -> ApiError {
    ApiError::forbidden(format!(
        "Account is locked until {}",
        until.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ))
}

/// Refresh token endpoint
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = payload.refresh_token;
    let claims = state
        .jwt_service
        .validate_token(&token, TokenType::Refresh)
        .map_err(|_| ApiError::Unauthenticated)?;

    if state
        .jwt_service
        .is_token_revoked(state.cache.as_ref(), &token)
        .await?
    {
        warn!("Revoked refresh token presented for session {}", claims.sid);
        return Err(ApiError::Unauthenticated);
    }

    state
        .sessions
        .get_session(claims.sid)
        .await?
        .filter(|session| session.user_id == claims.sub)
        .ok_or(ApiError::Unauthenticated)?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|user| user.is_active)
        .ok_or(ApiError::Unauthenticated)?;

    let pair = state
        .jwt_service
        .rotate_refresh_token(state.cache.as_ref(), &token, &claims, user.role)
        .await?;

    Ok(ApiResponse::ok(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer",
        expires_in: state.jwt_service.access_token_expiry(),
    }))
}

/// Logout endpoint; ends the session the refresh token belongs to
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = payload.refresh_token;
    let claims = state
        .jwt_service
        .validate_token(&token, TokenType::Refresh)
        .map_err(|_| ApiError::Unauthenticated)?;

    state
        .jwt_service
        .revoke_token(state.cache.as_ref(), &token, &claims)
        .await?;
    state.sessions.revoke_session(claims.sid).await?;

    info!("User {} logged out of session {}", claims.sub, claims.sid);
    Ok(ApiResponse::message("Logged out"))
}

/// Start a password reset; the answer never depends on the email
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<ResetRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = client_ip(&headers);
    throttle(
        &state.rate_limiter,
        ip_key("password_reset", ip.as_deref()),
        state.settings.rate_limits.password_reset,
    )
    .await?;

    reset::request_reset(&state, &normalize_email(&payload.email), ip).await?;

    Ok(ApiResponse::message(
        "If an account exists for that email, a reset link has been sent",
    ))
}

/// Finish a password reset with the emailed token
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<ResetConfirmRequest>,
) -> ApiResult<impl IntoResponse> {
    reset::confirm_reset(
        &state,
        &payload.token,
        &payload.password,
        client_ip(&headers),
    )
    .await?;

    Ok(ApiResponse::message("Password updated, please sign in again"))
}

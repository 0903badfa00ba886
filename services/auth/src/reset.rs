//! Password reset by emailed single-use token
//!
//! Only the SHA-256 digest of a token is stored. Requesting a reset never
//! reveals whether an account exists, and confirming one consumes the token
//! and ends every session of the account.

use chrono::{Duration, Utc};
use common::{
    audit::{AuditAction, AuditEvent, ResourceType},
    http::{ApiError, ApiResult},
    password::hash_password,
    token::{generate_token, sha256_hex},
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{models::ResetToken, state::AppState};

pub const TOKEN_LENGTH: usize = 48;

const INVALID_TOKEN: &str = "Invalid or expired reset token";

/// Issue a reset token for `email` if it belongs to an active account.
///
/// Delivery happens on a detached task; the handle is returned so callers
/// may wait for it.
pub async fn request_reset(
    state: &AppState,
    email: &str,
    ip_address: Option<String>,
) -> ApiResult<Option<JoinHandle<()>>> {
    let Some(user) = state.users.find_by_email(email).await? else {
        debug!("Password reset requested for unknown email");
        return Ok(None);
    };

    if !user.is_active {
        debug!("Password reset requested for inactive user {}", user.id);
        return Ok(None);
    }

    let token = generate_token(TOKEN_LENGTH);
    let expires_at =
        Utc::now() + Duration::seconds(state.settings.password_reset.token_ttl_seconds as i64);
    state
        .users
        .replace_reset_token(&ResetToken::identifier_for(user.id), &sha256_hex(&token), expires_at)
        .await?;

    state.audit.record(
        AuditEvent::new(AuditAction::PasswordResetRequested, ResourceType::User)
            .actor(user.id, user.role)
            .resource(user.id)
            .ip(ip_address),
    );

    let link = format!("{}?token={}", state.settings.password_reset.reset_url, token);
    let mailer = state.mailer.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = mailer.send_password_reset(&user.email, &link).await {
            warn!("Failed to send password reset email: {:#}", e);
        }
    });

    info!("Issued password reset token for user {}", user.id);
    Ok(Some(handle))
}

/// Consume `token` and set a new password; returns the account id
pub async fn confirm_reset(
    state: &AppState,
    token: &str,
    new_password: &str,
    ip_address: Option<String>,
) -> ApiResult<Uuid> {
    let consumed = state
        .users
        .take_reset_token(&sha256_hex(token))
        .await?
        .ok_or_else(|| ApiError::bad_request(INVALID_TOKEN))?;

    if consumed.is_expired(Utc::now()) {
        return Err(ApiError::bad_request(INVALID_TOKEN));
    }

    let user_id = consumed
        .user_id()
        .ok_or_else(|| ApiError::bad_request(INVALID_TOKEN))?;

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::bad_request(INVALID_TOKEN))?;

    let password_hash = hash_password(new_password)?;
    state.users.update_password(user.id, &password_hash).await?;

    let revoked = state.sessions.force_logout_user(user.id).await?;
    state.sessions.clear_lockout(user.id).await?;

    state.audit.record(
        AuditEvent::new(AuditAction::PasswordResetCompleted, ResourceType::User)
            .actor(user.id, user.role)
            .resource(user.id)
            .ip(ip_address)
            .metadata(serde_json::json!({ "revokedSessions": revoked })),
    );

    info!("Password reset completed for user {}", user.id);
    Ok(user.id)
}

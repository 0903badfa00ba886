//! Marketplace API routes
//!
//! Each area builds its own route groups, one per security policy, and the
//! groups are merged here.

mod admin;
mod brands;
mod categories;
mod contact;
mod coupons;
mod search;
mod submissions;
mod user;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use common::{
    audit::{AuditAction, AuditEvent, ResourceType},
    database,
    http::{ApiError, ApiResult},
    validation::slugify,
};

use crate::{repositories::Duplicate, security::Identity, state::AppState};

/// Create the router for the marketplace API
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(brands::router(&state))
        .merge(categories::router(&state))
        .merge(coupons::router(&state))
        .merge(search::router(&state))
        .merge(submissions::router(&state))
        .merge(contact::router(&state))
        .merge(user::router(&state))
        .merge(admin::router(&state))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.sessions.health_check().await.unwrap_or(false);
    let db = database::health_check(&state.pool).await.unwrap_or(false);
    Json(serde_json::json!({
        "status": if cache && db { "ok" } else { "degraded" },
        "service": "api-service"
    }))
}

/// Turn a unique-key violation into a `Conflict` (400), anything else into a 500
fn duplicate_as_conflict(error: anyhow::Error) -> ApiError {
    match error.downcast_ref::<Duplicate>() {
        Some(duplicate) => ApiError::conflict(duplicate.to_string()),
        None => ApiError::Internal(error),
    }
}

/// Explicit slug, or one derived from `name`
fn slug_for(explicit: Option<&str>, name: &str) -> ApiResult<String> {
    let slug = match explicit {
        Some(slug) => slug.to_string(),
        None => slugify(name),
    };
    if slug.is_empty() {
        return Err(ApiError::invalid_field(
            "slug",
            "A slug could not be derived from the name",
        ));
    }
    Ok(slug)
}

/// Audit event attributed to the signed-in caller
fn audited(
    actor: &Identity,
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: impl ToString,
) -> AuditEvent {
    AuditEvent::new(action, resource_type)
        .actor(actor.user_id, actor.role)
        .resource(resource_id)
        .ip(actor.ip_address.clone())
}

/// Administrators may opt into inactive records on listings
fn include_inactive(requested: Option<bool>, identity: Option<&Identity>) -> bool {
    requested.unwrap_or(false) && identity.is_some_and(|identity| identity.role.is_admin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use common::auth::Role;
    use uuid::Uuid;

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            role,
            session_id: Uuid::new_v4(),
            ip_address: None,
        }
    }

    #[test]
    fn test_include_inactive_is_admin_only() {
        let user = identity(Role::User);
        let admin = identity(Role::Admin);

        assert!(!include_inactive(Some(true), None));
        assert!(!include_inactive(Some(true), Some(&user)));
        assert!(!include_inactive(None, Some(&admin)));
        assert!(include_inactive(Some(true), Some(&admin)));
    }

    #[test]
    fn test_slug_is_derived_from_name() {
        assert_eq!(slug_for(None, "Acme Shoes").unwrap(), "acme-shoes");
        assert_eq!(slug_for(Some("acme"), "Acme Shoes").unwrap(), "acme");
        assert!(matches!(
            slug_for(None, "!!!"),
            Err(ApiError::ValidationFailed(errors)) if errors.contains_key("slug")
        ));
    }

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let error = duplicate_as_conflict(Duplicate("Brand").into());
        assert!(matches!(error, ApiError::Conflict(ref message) if message == "Brand already exists"));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let error = duplicate_as_conflict(anyhow::anyhow!("connection reset"));
        assert!(matches!(error, ApiError::Internal(_)));
    }
}

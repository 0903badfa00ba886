//! Contact and partnership requests

use axum::{
    Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use common::http::{ApiResponse, ApiResult, ValidatedJson, ValidatedQuery};
use tracing::info;

use crate::{
    models::{ContactListQuery, ContactRequest},
    security::{Policy, protect},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let submit = Router::new().route("/contact", post(create_contact));
    let review = Router::new().route("/contact", get(list_contacts));

    protect(
        submit,
        state,
        Policy::PUBLIC.rate_limited(state.settings.rate_limits.contact),
    )
    .merge(protect(review, state, Policy::ADMIN))
}

async fn create_contact(
    State(state): State<AppState>,
    ValidatedJson(mut request): ValidatedJson<ContactRequest>,
) -> ApiResult<impl IntoResponse> {
    request.email = request.email.trim().to_lowercase();
    let contact = state.repos.contacts.insert(&request).await?;
    info!(
        "Received {:?} request {}",
        contact.submission_type, contact.id
    );
    Ok(ApiResponse::created(contact).with_message("Thanks, we will get back to you soon"))
}

async fn list_contacts(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ContactListQuery>,
) -> ApiResult<impl IntoResponse> {
    let (contacts, total) = state.repos.contacts.list(&query).await?;
    Ok(ApiResponse::paginated(
        contacts,
        query.page_params().pagination(total),
    ))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestContext, body_json, send};
    use axum::http::{Method, StatusCode};
    use common::auth::Role;
    use serde_json::json;

    #[tokio::test]
    async fn test_partner_request_needs_company() {
        let ctx = TestContext::new();
        let body = json!({
            "type": "PARTNER",
            "name": "Ada",
            "email": "ada@example.com",
            "message": "We would like to list our deals with you.",
        });

        let response = send(&ctx, Method::POST, "/contact", None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["errors"].is_object());
    }

    #[tokio::test]
    async fn test_short_message_is_rejected() {
        let ctx = TestContext::new();
        let body = json!({
            "type": "CONTACT",
            "name": "Ada",
            "email": "ada@example.com",
            "message": "hi",
        });

        let response = send(&ctx, Method::POST, "/contact", None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["errors"]["message"].is_array());
    }

    #[tokio::test]
    async fn test_listing_requires_admin() {
        let ctx = TestContext::new();
        let user = ctx.sign_in(Role::User).await;

        let response = send(&ctx, Method::GET, "/contact", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&ctx, Method::GET, "/contact", Some(&user), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

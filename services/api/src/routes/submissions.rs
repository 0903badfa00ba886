//! Community submissions and their moderation

use axum::{
    Router,
    extract::State,
    response::IntoResponse,
    routing::{get, patch, post},
};
use common::http::{ApiResponse, ApiResult, ValidatedJson, ValidatedQuery};

use crate::{
    models::{CreateSubmissionRequest, SubmissionListQuery, SubmissionPatch},
    security::{Identity, Policy, protect},
    state::AppState,
    submissions::PatchOutcome,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let rules = &state.settings.rate_limits;

    let submit = Router::new().route("/submissions", post(create_submission));
    let review = Router::new().route("/submissions", get(list_submissions));
    let moderate = Router::new().route("/submissions", patch(update_submission));

    protect(
        submit,
        state,
        Policy::PUBLIC.rate_limited(rules.submissions),
    )
    .merge(protect(review, state, Policy::ADMIN))
    .merge(protect(
        moderate,
        state,
        Policy::ADMIN.with_csrf().rate_limited(rules.admin_mutations),
    ))
}

/// Anyone may submit; signed-in submitters are remembered
async fn create_submission(
    State(state): State<AppState>,
    identity: Option<Identity>,
    ValidatedJson(request): ValidatedJson<CreateSubmissionRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = identity.map(|identity| identity.user_id);
    let submission = state.submissions.create(&request, user_id).await?;
    Ok(ApiResponse::created(submission).with_message("Submission received"))
}

async fn list_submissions(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<SubmissionListQuery>,
) -> ApiResult<impl IntoResponse> {
    let (submissions, pagination) = state.submissions.list(&query).await?;
    Ok(ApiResponse::paginated(submissions, pagination))
}

async fn update_submission(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(patch): ValidatedJson<SubmissionPatch>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.submissions.apply(patch, &identity).await?;
    let message = match &outcome {
        PatchOutcome::Status(_) => "Submission updated",
        PatchOutcome::Moved(moved) if moved.existed => "Brand already existed; reused it",
        PatchOutcome::Moved(moved) if moved.status_changed => "Submission moved and decided",
        PatchOutcome::Moved(_) => "Submission moved",
    };
    Ok(ApiResponse::ok(outcome).with_message(message))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestContext, body_json, send, settle};
    use axum::http::{Method, StatusCode};
    use common::auth::Role;
    use serde_json::json;

    #[tokio::test]
    async fn test_anonymous_submission_is_pending() {
        let ctx = TestContext::new();
        let body = json!({ "type": "BRAND", "payload": { "name": "Acme" } });

        let response = send(&ctx, Method::POST, "/submissions", None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "PENDING");
        assert_eq!(json["data"]["type"], "BRAND");
        assert!(json["data"]["userId"].is_null());
    }

    #[tokio::test]
    async fn test_signed_in_submitter_is_recorded() {
        let ctx = TestContext::new();
        let user = ctx.sign_in(Role::User).await;
        let body = json!({ "type": "COUPON", "payload": { "title": "10% off" } });

        let response = send(&ctx, Method::POST, "/submissions", Some(&user), Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_json(response).await["data"]["userId"],
            user.user_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_invalid_submissions_are_rejected() {
        let ctx = TestContext::new();

        for body in [
            json!({ "type": "STORE", "payload": { "name": "Acme" } }),
            json!({ "type": "BRAND", "payload": { "website": "acme.test" } }),
            json!({ "type": "COUPON", "payload": ["not", "an", "object"] }),
        ] {
            let response = send(&ctx, Method::POST, "/submissions", None, Some(body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(body_json(response).await["errors"].is_object());
        }
    }

    #[tokio::test]
    async fn test_submissions_are_rate_limited_per_address() {
        let ctx = TestContext::new();
        let allowed = ctx.state.settings.rate_limits.submissions.max_requests;
        let body = json!({ "type": "BRAND", "payload": { "name": "Acme" } });

        for _ in 0..allowed {
            let response = send(&ctx, Method::POST, "/submissions", None, Some(body.clone())).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        let response = send(&ctx, Method::POST, "/submissions", None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_review_flow() {
        let ctx = TestContext::new();
        let user = ctx.sign_in(Role::User).await;
        let admin = ctx.sign_in(Role::Admin).await;

        let body = json!({ "type": "BRAND", "payload": { "name": "Acme Shoes" } });
        let response = send(&ctx, Method::POST, "/submissions", None, Some(body)).await;
        let id = body_json(response).await["data"]["id"].clone();

        let response = send(&ctx, Method::GET, "/submissions", Some(&user), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&ctx, Method::GET, "/submissions?status=PENDING", Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
        assert_eq!(json["pagination"]["total"], 1);

        let moved = json!({ "id": id, "action": "move", "status": "APPROVED" });
        let response = send(&ctx, Method::PATCH, "/submissions", Some(&admin), Some(moved)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["statusChanged"], true);
        assert_eq!(json["data"]["submission"]["status"], "APPROVED");
        assert_eq!(ctx.store.brand_count().await, 1);

        let decided = json!({ "id": id, "action": "status", "status": "REJECTED" });
        let response = send(&ctx, Method::PATCH, "/submissions", Some(&admin), Some(decided)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        settle().await;
        let actions: Vec<String> = ctx
            .audit
            .entries()
            .await
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(actions, ["SUBMISSION_MOVED"]);
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let ctx = TestContext::new();
        let admin = ctx.sign_in(Role::Admin).await;

        let body = json!({ "id": uuid::Uuid::new_v4(), "action": "publish" });
        let response = send(&ctx, Method::PATCH, "/submissions", Some(&admin), Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

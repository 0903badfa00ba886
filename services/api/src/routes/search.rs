//! Site-wide search over coupons, brands and categories

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use common::http::{ApiResponse, ApiResult, ValidatedQuery};

use crate::{
    models::{SearchQuery, SearchResults, SearchScope},
    security::{Policy, protect},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    protect(
        Router::new().route("/search", get(search)),
        state,
        Policy::PUBLIC.rate_limited(state.settings.rate_limits.search),
    )
}

/// Case-insensitive substring match; only active records are returned
async fn search(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let term = query.q.trim();
    let limit = query.limit();
    let repos = &state.repos;

    let (coupons, brands, categories) = tokio::try_join!(
        async {
            if query.scope.includes(SearchScope::Coupons) {
                repos.coupons.search(term, limit).await
            } else {
                Ok(Vec::new())
            }
        },
        async {
            if query.scope.includes(SearchScope::Brands) {
                repos.brands.search(term, limit).await
            } else {
                Ok(Vec::new())
            }
        },
        async {
            if query.scope.includes(SearchScope::Categories) {
                repos.categories.search(term, limit).await
            } else {
                Ok(Vec::new())
            }
        },
    )?;

    Ok(ApiResponse::ok(SearchResults {
        coupons,
        brands,
        categories,
    }))
}

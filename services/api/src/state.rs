//! Application state shared across handlers

use common::{
    audit::AuditLogger, auth::TokenVerifier, rate_limit::RateLimiter, session::SessionManager,
    settings::Settings,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    catalog::Catalog, redemption::Redemptions, repositories::Repositories,
    submissions::SubmissionWorkflow,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repos: Repositories,
    pub submissions: SubmissionWorkflow,
    pub redemptions: Redemptions,
    pub catalog: Catalog,
    pub sessions: SessionManager,
    pub verifier: TokenVerifier,
    pub rate_limiter: RateLimiter,
    pub audit: AuditLogger,
    pub settings: Arc<Settings>,
}

use common::{
    audit::AuditLogger, cache::Cache, rate_limit::RateLimiter, session::SessionManager,
    settings::Settings,
};
use std::sync::Arc;

use crate::{jwt::JwtService, mailer::Mailer, repositories::IdentityStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn IdentityStore>,
    pub cache: Arc<dyn Cache>,
    pub sessions: SessionManager,
    pub jwt_service: JwtService,
    /// Registration and password reset throttling
    pub rate_limiter: RateLimiter,
    /// Per-address login throttling with a ban
    pub login_limiter: RateLimiter,
    pub audit: AuditLogger,
    pub mailer: Arc<dyn Mailer>,
    pub settings: Arc<Settings>,
}

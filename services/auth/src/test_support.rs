//! Builders for handler tests: everything in memory, keys from `fixtures/`

use common::{
    audit::{AuditLogger, MemoryAuditStore},
    cache::MemoryCache,
    password::hash_password,
    rate_limit::RateLimiter,
    session::{LockoutPolicy, SessionManager},
    settings::Settings,
};
use std::{sync::Arc, time::Duration};

use crate::{
    jwt::{JwtConfig, JwtService},
    mailer::recording::RecordingMailer,
    models::{NewUser, User},
    repositories::{IdentityStore, MemoryIdentityStore},
    state::AppState,
};

pub fn jwt_service() -> JwtService {
    JwtService::new(JwtConfig {
        private_key: include_str!("../../../fixtures/jwt_test_private.pem").to_string(),
        public_key: include_str!("../../../fixtures/jwt_test_public.pem").to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 3600,
    })
    .expect("test keys are valid")
}

pub struct TestContext {
    pub state: AppState,
    pub users: Arc<MemoryIdentityStore>,
    pub mailer: Arc<RecordingMailer>,
    pub audit: MemoryAuditStore,
}

impl TestContext {
    pub fn new() -> Self {
        let users = Arc::new(MemoryIdentityStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let audit = MemoryAuditStore::new();
        let cache = Arc::new(MemoryCache::new());
        let settings = Settings::default();

        let state = AppState {
            users: users.clone(),
            cache: cache.clone(),
            sessions: SessionManager::new(
                cache,
                settings.session.ttl_seconds,
                LockoutPolicy::from(&settings.lockout),
            ),
            jwt_service: jwt_service(),
            rate_limiter: RateLimiter::new(),
            login_limiter: RateLimiter::with_ban(Duration::from_secs(900)),
            audit: AuditLogger::new(Arc::new(audit.clone())),
            mailer: mailer.clone(),
            settings: Arc::new(settings),
        };

        Self {
            state,
            users,
            mailer,
            audit,
        }
    }
}

pub async fn register_user(ctx: &TestContext, email: &str, password: &str) -> User {
    ctx.users
        .create_user(&NewUser {
            email: email.to_string(),
            name: None,
            password_hash: hash_password(password).expect("hashing succeeds"),
        })
        .await
        .expect("user is created")
}

/// Let detached audit and mail tasks run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

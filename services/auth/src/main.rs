use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;

mod jwt;
mod mailer;
mod maintenance;
mod models;
mod repositories;
mod reset;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use common::{
    audit::{AuditLogger, PgAuditStore},
    cache::{Cache, RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    http::{shutdown_signal, with_standard_layers},
    rate_limit::RateLimiter,
    session::{LockoutPolicy, SessionManager},
    settings::Settings,
};

use crate::{
    jwt::{JwtConfig, JwtService},
    mailer::LogMailer,
    maintenance::{HOURLY, TokenSweeper},
    repositories::UserRepository,
    state::AppState,
};

const DEFAULT_PORT: u16 = 3000;

/// How long an address stays banned after too many login attempts
const LOGIN_BAN: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    common::logging::init("auth");

    info!("Starting authentication service");

    let settings = Settings::load("auth")?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    // Initialize Redis connection pool
    let redis_config = RedisConfig::from_env()?;
    let cache: Arc<dyn Cache> = Arc::new(RedisPool::new(&redis_config).await?);

    let jwt_service = JwtService::new(JwtConfig::from_env(settings.session.ttl_seconds)?)?;
    let sessions = SessionManager::new(
        cache.clone(),
        settings.session.ttl_seconds,
        LockoutPolicy::from(&settings.lockout),
    );
    let users = Arc::new(UserRepository::new(pool.clone()));

    let _sweeper = TokenSweeper::new(users.clone()).start(HOURLY).await?;

    let port = settings.server.port.unwrap_or(DEFAULT_PORT);
    let address = format!("{}:{}", settings.server.host, port);

    let app_state = AppState {
        users,
        cache,
        sessions,
        jwt_service,
        rate_limiter: RateLimiter::new(),
        login_limiter: RateLimiter::with_ban(LOGIN_BAN),
        audit: AuditLogger::new(Arc::new(PgAuditStore::new(pool))),
        mailer: Arc::new(LogMailer),
        settings: Arc::new(settings.clone()),
    };

    let app = with_standard_layers(routes::create_router(app_state), &settings.server);

    let listener = TcpListener::bind(&address).await?;
    info!("Authentication service listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod catalog;
mod models;
mod redemption;
mod repositories;
mod routes;
mod security;
mod state;
mod submissions;
#[cfg(test)]
mod test_support;

use common::{
    audit::{AuditLogger, PgAuditStore},
    auth::TokenVerifier,
    cache::{Cache, RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    http::{shutdown_signal, with_standard_layers},
    rate_limit::RateLimiter,
    session::{LockoutPolicy, SessionManager},
    settings::Settings,
};

use crate::{
    catalog::Catalog, redemption::Redemptions, repositories::Repositories, state::AppState,
    submissions::SubmissionWorkflow,
};

const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    common::logging::init("api");

    info!("Starting marketplace API service");

    let settings = Settings::load("api")?;

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

    let sessions = SessionManager::new(
        cache,
        settings.session.ttl_seconds,
        LockoutPolicy::from(&settings.lockout),
    );
    let verifier = TokenVerifier::from_env()?;

    let repos = Repositories::new(pool.clone());
    let stores = Arc::new(repos.clone());
    let audit = AuditLogger::new(Arc::new(PgAuditStore::new(pool.clone())));

    let port = settings.server.port.unwrap_or(DEFAULT_PORT);
    let address = format!("{}:{}", settings.server.host, port);

    let app_state = AppState {
        pool,
        submissions: SubmissionWorkflow::new(
            stores.clone(),
            audit.clone(),
            settings.submissions.default_category_slug.clone(),
        ),
        redemptions: Redemptions::new(stores.clone()),
        catalog: Catalog::new(stores, audit.clone()),
        repos,
        sessions,
        verifier,
        rate_limiter: RateLimiter::new(),
        audit,
        settings: Arc::new(settings.clone()),
    };

    let app = with_standard_layers(routes::create_router(app_state), &settings.server);

    let listener = TcpListener::bind(&address).await?;
    info!("Marketplace API listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

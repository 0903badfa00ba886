//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and Redis cache
//! are properly configured and accessible from the application. They need
//! live services and are ignored by default:
//! `cargo test -p common -- --ignored`

use std::sync::Arc;

use common::{
    audit::{AuditAction, AuditEvent, AuditFilter, AuditLogger, PgAuditStore, ResourceType},
    auth::Role,
    cache::{Cache, RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    session::{ClientInfo, LockoutPolicy, SessionManager},
};
use sqlx::Row;
use uuid::Uuid;

/// Test that verifies both PostgreSQL and Redis are accessible
/// and can perform basic operations
#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let test_key = "integration_test_key";
    redis_pool.set(test_key, "integration_test_value", Some(10)).await?;
    assert_eq!(
        redis_pool.get(test_key).await?,
        Some("integration_test_value".to_string()),
        "Redis SET/GET test failed"
    );

    redis_pool.delete(test_key).await?;
    assert_eq!(redis_pool.get(test_key).await?, None, "Redis delete failed");

    Ok(())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_sessions_on_redis() -> Result<(), Box<dyn std::error::Error>> {
    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
    let sessions = SessionManager::new(Arc::new(redis_pool), 60, LockoutPolicy::default());
    let user_id = Uuid::new_v4();

    let record = sessions
        .create_session(user_id, Role::User, ClientInfo::default())
        .await?;
    assert!(sessions.get_session(record.id).await?.is_some());
    assert!(sessions.stats().await?.active_sessions >= 1);

    assert_eq!(sessions.force_logout_user(user_id).await?, 1);
    assert_eq!(sessions.force_logout_user(user_id).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_audit_round_trip_on_postgres() -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool).await?;

    let logger = AuditLogger::new(Arc::new(PgAuditStore::new(pool)));
    let resource = Uuid::new_v4();
    logger
        .record(AuditEvent::new(AuditAction::BrandCreated, ResourceType::Brand).resource(resource))
        .await?;

    let page = logger
        .query(&AuditFilter {
            resource_id: Some(resource.to_string()),
            ..AuditFilter::default()
        })
        .await?;
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.entries[0].action, "BRAND_CREATED");
    Ok(())
}

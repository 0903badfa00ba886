//! Audit trail for administrative and security-relevant actions
//!
//! Entries are immutable: the store only appends and reads. Writes go
//! through a detached task so a failing audit write never rolls back or
//! fails the action being audited.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::Role,
    http::{ApiError, FieldErrors, Pagination},
};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown value: {}", other)),
                }
            }
        }
    };
}

wire_enum!(
    /// What happened
    AuditAction {
        BrandCreated => "BRAND_CREATED",
        BrandUpdated => "BRAND_UPDATED",
        BrandDeleted => "BRAND_DELETED",
        CategoryCreated => "CATEGORY_CREATED",
        CategoryUpdated => "CATEGORY_UPDATED",
        CategoryDeleted => "CATEGORY_DELETED",
        CouponCreated => "COUPON_CREATED",
        CouponUpdated => "COUPON_UPDATED",
        CouponDeleted => "COUPON_DELETED",
        SubmissionStatusChanged => "SUBMISSION_STATUS_CHANGED",
        SubmissionMoved => "SUBMISSION_MOVED",
        UserUpdated => "USER_UPDATED",
        ForceLogout => "FORCE_LOGOUT",
        LockoutCleared => "LOCKOUT_CLEARED",
        LoginFailed => "LOGIN_FAILED",
        AccountLocked => "ACCOUNT_LOCKED",
        PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
        PasswordResetCompleted => "PASSWORD_RESET_COMPLETED",
        PasswordChanged => "PASSWORD_CHANGED",
    }
);

impl AuditAction {
    /// Actions shown on the security dashboard
    pub const SECURITY: &'static [AuditAction] = &[
        AuditAction::ForceLogout,
        AuditAction::LockoutCleared,
        AuditAction::LoginFailed,
        AuditAction::AccountLocked,
        AuditAction::PasswordResetRequested,
        AuditAction::PasswordResetCompleted,
        AuditAction::PasswordChanged,
    ];
}

wire_enum!(
    /// What kind of record the action touched
    ResourceType {
        Brand => "BRAND",
        Category => "CATEGORY",
        Coupon => "COUPON",
        Submission => "SUBMISSION",
        User => "USER",
        Session => "SESSION",
    }
);

/// An action about to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<Role>,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: Value,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            action,
            actor_id: None,
            actor_role: None,
            resource_type,
            resource_id: None,
            ip_address: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn actor(mut self, actor_id: Uuid, role: Role) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_role = Some(role);
        self
    }

    pub fn resource(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A stored audit entry
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<Role>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Raw `GET /admin/audit-logs` query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Validated audit query
#[derive(Debug, Clone, PartialEq)]
pub struct AuditFilter {
    pub page: u32,
    pub limit: u32,
    pub actions: Vec<AuditAction>,
    pub actor_id: Option<Uuid>,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
            actions: Vec::new(),
            actor_id: None,
            resource_type: None,
            resource_id: None,
            from: None,
            to: None,
        }
    }
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    fn matches(&self, entry: &AuditLogEntry) -> bool {
        (self.actions.is_empty() || self.actions.iter().any(|a| a.as_str() == entry.action))
            && self.actor_id.is_none_or(|id| entry.actor_id == Some(id))
            && self
                .resource_type
                .is_none_or(|t| t.as_str() == entry.resource_type)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|id| entry.resource_id.as_ref() == Some(id))
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
    }
}

impl TryFrom<AuditQuery> for AuditFilter {
    type Error = ApiError;

    fn try_from(query: AuditQuery) -> Result<Self, Self::Error> {
        let mut errors = FieldErrors::new();
        let mut reject = |field: &str, message: String| {
            errors.entry(field.to_string()).or_default().push(message);
        };

        let page = match query.page.as_deref() {
            None => 1,
            Some(raw) => match raw.parse::<u32>() {
                Ok(page) if page >= 1 => page,
                _ => {
                    reject("page", "page must be a positive integer".to_string());
                    1
                }
            },
        };

        let limit = match query.limit.as_deref() {
            None => Self::DEFAULT_LIMIT,
            Some(raw) => match raw.parse::<u32>() {
                Ok(limit) if (1..=Self::MAX_LIMIT).contains(&limit) => limit,
                _ => {
                    reject(
                        "limit",
                        format!("limit must be between 1 and {}", Self::MAX_LIMIT),
                    );
                    Self::DEFAULT_LIMIT
                }
            },
        };

        let mut actions = Vec::new();
        if let Some(raw) = query.action.as_deref() {
            match raw.parse::<AuditAction>() {
                Ok(action) => actions.push(action),
                Err(e) => reject("action", e),
            }
        }

        let actor_id = query
            .actor_id
            .as_deref()
            .and_then(|raw| match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    reject("actorId", "actorId must be a UUID".to_string());
                    None
                }
            });

        let resource_type =
            query
                .resource_type
                .as_deref()
                .and_then(|raw| match raw.parse::<ResourceType>() {
                    Ok(t) => Some(t),
                    Err(e) => {
                        reject("resourceType", e);
                        None
                    }
                });

        let mut parse_time = |field: &str, raw: Option<&str>| {
            raw.and_then(|raw| match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(_) => {
                    reject(field, format!("{} must be an RFC 3339 timestamp", field));
                    None
                }
            })
        };
        let from = parse_time("from", query.from.as_deref());
        let to = parse_time("to", query.to.as_deref());

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                reject("from", "from must not be after to".to_string());
            }
        }

        let resource_id = query.resource_id.filter(|id| !id.trim().is_empty());

        if !errors.is_empty() {
            return Err(ApiError::ValidationFailed(errors));
        }

        Ok(Self {
            page,
            limit,
            actions,
            actor_id,
            resource_type,
            resource_id,
            from,
            to,
        })
    }
}

/// One page of audit entries, newest first
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    pub pagination: Pagination,
}

/// Persistence for audit entries
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, event: &AuditEvent) -> Result<()>;

    /// Matching entries for the requested page plus the total match count
    async fn query(&self, filter: &AuditFilter) -> Result<(Vec<AuditLogEntry>, i64)>;
}

/// Audit logger
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append an entry in the background. Failures are logged and dropped.
    pub fn record(&self, event: AuditEvent) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            match store.insert(&event).await {
                Ok(()) => debug!(
                    "Audit {} on {}",
                    event.action.as_str(),
                    event.resource_type.as_str()
                ),
                Err(e) => warn!(
                    "Failed to write audit entry {} for {:?}: {:#}",
                    event.action.as_str(),
                    event.resource_id,
                    e
                ),
            }
        })
    }

    /// Page through entries matching the filter
    pub async fn query(&self, filter: &AuditFilter) -> Result<AuditPage> {
        let (entries, total) = self.store.query(filter).await?;
        Ok(AuditPage {
            entries,
            pagination: Pagination::new(filter.page, filter.limit, total),
        })
    }
}

/// PostgreSQL audit store
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
        builder.push(" WHERE TRUE");
        if !filter.actions.is_empty() {
            let actions: Vec<String> = filter
                .actions
                .iter()
                .map(|a| a.as_str().to_string())
                .collect();
            builder.push(" AND action = ANY(").push_bind(actions).push(")");
        }
        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
        if let Some(resource_type) = filter.resource_type {
            builder
                .push(" AND resource_type = ")
                .push_bind(resource_type.as_str());
        }
        if let Some(resource_id) = &filter.resource_id {
            builder.push(" AND resource_id = ").push_bind(resource_id.clone());
        }
        if let Some(from) = filter.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND created_at <= ").push_bind(to);
        }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (action, actor_id, actor_role, resource_type, resource_id, ip_address, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.action.as_str())
        .bind(event.actor_id)
        .bind(event.actor_role)
        .bind(event.resource_type.as_str())
        .bind(&event.resource_id)
        .bind(&event.ip_address)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<(Vec<AuditLogEntry>, i64)> {
        let mut select = QueryBuilder::new(
            "SELECT id, action, actor_id, actor_role, resource_type, resource_id, \
             ip_address, metadata, created_at FROM audit_logs",
        );
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let entries = select
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        Self::push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((entries, total))
    }
}

/// In-process audit store for development and tests
#[derive(Clone, Default)]
pub struct MemoryAuditStore {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in insertion order
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, event: &AuditEvent) -> Result<()> {
        self.entries.lock().await.push(AuditLogEntry {
            id: Uuid::new_v4(),
            action: event.action.as_str().to_string(),
            actor_id: event.actor_id,
            actor_role: event.actor_role,
            resource_type: event.resource_type.as_str().to_string(),
            resource_id: event.resource_id.clone(),
            ip_address: event.ip_address.clone(),
            metadata: event.metadata.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<(Vec<AuditLogEntry>, i64)> {
        let entries = self.entries.lock().await;
        let mut matching: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // Newest first; insertion order breaks timestamp ties
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingStore;

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn insert(&self, _event: &AuditEvent) -> Result<()> {
            anyhow::bail!("database unavailable")
        }

        async fn query(&self, _filter: &AuditFilter) -> Result<(Vec<AuditLogEntry>, i64)> {
            anyhow::bail!("database unavailable")
        }
    }

    fn query(pairs: &[(&str, &str)]) -> AuditQuery {
        let value: serde_json::Map<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        serde_json::from_value(Value::Object(value)).unwrap()
    }

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::ValidationFailed(fields) => fields,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_defaults() {
        let filter = AuditFilter::try_from(AuditQuery::default()).unwrap();
        assert_eq!(filter, AuditFilter::default());
    }

    #[test]
    fn test_filter_parses_known_values() {
        let actor = Uuid::new_v4();
        let filter = AuditFilter::try_from(query(&[
            ("page", "2"),
            ("limit", "50"),
            ("action", "FORCE_LOGOUT"),
            ("actorId", &actor.to_string()),
            ("resourceType", "USER"),
            ("from", "2026-01-01T00:00:00Z"),
            ("to", "2026-02-01T00:00:00Z"),
        ]))
        .unwrap();

        assert_eq!(filter.page, 2);
        assert_eq!(filter.limit, 50);
        assert_eq!(filter.actions, vec![AuditAction::ForceLogout]);
        assert_eq!(filter.actor_id, Some(actor));
        assert_eq!(filter.resource_type, Some(ResourceType::User));
        assert_eq!(filter.offset(), 50);
    }

    #[test]
    fn test_filter_rejects_invalid_values() {
        let errors = field_errors(
            AuditFilter::try_from(query(&[
                ("limit", "101"),
                ("action", "DROP_TABLE"),
                ("actorId", "nope"),
                ("from", "yesterday"),
            ]))
            .unwrap_err(),
        );

        assert!(errors.contains_key("limit"));
        assert!(errors.contains_key("action"));
        assert!(errors.contains_key("actorId"));
        assert!(errors.contains_key("from"));
    }

    #[test]
    fn test_filter_rejects_zero_limit_and_inverted_range() {
        let errors = field_errors(
            AuditFilter::try_from(query(&[
                ("limit", "0"),
                ("from", "2026-02-01T00:00:00Z"),
                ("to", "2026-01-01T00:00:00Z"),
            ]))
            .unwrap_err(),
        );
        assert!(errors.contains_key("limit"));
        assert!(errors.contains_key("from"));
    }

    #[tokio::test]
    async fn test_record_failure_does_not_propagate() {
        let logger = AuditLogger::new(Arc::new(FailingStore));
        let handle = logger.record(AuditEvent::new(
            AuditAction::BrandCreated,
            ResourceType::Brand,
        ));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_newest_first() -> Result<()> {
        let store = MemoryAuditStore::new();
        let logger = AuditLogger::new(Arc::new(store.clone()));
        let admin = Uuid::new_v4();

        for i in 0..3 {
            logger
                .record(
                    AuditEvent::new(AuditAction::CouponUpdated, ResourceType::Coupon)
                        .actor(admin, Role::Admin)
                        .resource(i),
                )
                .await?;
        }
        logger
            .record(AuditEvent::new(AuditAction::ForceLogout, ResourceType::User))
            .await?;

        let page = logger
            .query(&AuditFilter {
                actions: vec![AuditAction::CouponUpdated],
                limit: 2,
                ..AuditFilter::default()
            })
            .await?;

        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].resource_id.as_deref(), Some("2"));
        assert!(page.entries.iter().all(|e| e.actor_id == Some(admin)));
        Ok(())
    }
}

//! Coupon redemption recording
//!
//! Preconditions are checked in order: the coupon exists, is active and
//! has uses left. The limit check and the increment are one conditional
//! update, so concurrent redemptions never push `used_count` past the
//! limit. The usage row is written by a detached task.
//!
//! Storage failures never block the caller's outbound redirect: they are
//! logged and answered with `recorded: false`.

use anyhow::Result;
use async_trait::async_trait;
use common::{
    http::{ApiError, ApiResult},
    session::ClientInfo,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::NewUsage;

/// Redemption-relevant state of a coupon
#[derive(Debug, Clone, PartialEq)]
pub struct CouponAvailability {
    pub is_active: bool,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub affiliate_url: Option<String>,
}

impl CouponAvailability {
    pub fn limit_reached(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }
}

#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn coupon_availability(&self, coupon_id: Uuid) -> Result<Option<CouponAvailability>>;

    /// Add one use if the coupon is active and below its limit.
    ///
    /// Returns the new count, or `None` when the update was refused.
    async fn try_increment_usage(&self, coupon_id: Uuid) -> Result<Option<i32>>;

    async fn insert_usage(&self, usage: &NewUsage) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliate_url: Option<String>,
    pub recorded: bool,
}

impl Redemption {
    fn unrecorded() -> Self {
        Self {
            coupon_id: None,
            used_count: None,
            affiliate_url: None,
            recorded: false,
        }
    }
}

#[derive(Clone)]
pub struct Redemptions {
    store: Arc<dyn RedemptionStore>,
}

impl Redemptions {
    pub fn new(store: Arc<dyn RedemptionStore>) -> Self {
        Self { store }
    }

    /// Count one use of `coupon_id`.
    ///
    /// The handle of the usage-row task is returned when one was spawned.
    pub async fn redeem(
        &self,
        coupon_id: Uuid,
        user_id: Option<Uuid>,
        client: ClientInfo,
    ) -> ApiResult<(Redemption, Option<JoinHandle<()>>)> {
        let availability = match self.store.coupon_availability(coupon_id).await {
            Ok(Some(availability)) => availability,
            Ok(None) => return Err(ApiError::not_found("Coupon not found")),
            Err(e) => {
                error!("Failed to load coupon {} for redemption: {:#}", coupon_id, e);
                return Ok((Redemption::unrecorded(), None));
            }
        };

        if !availability.is_active {
            return Err(ApiError::bad_request("Coupon is not active"));
        }
        if availability.limit_reached() {
            return Err(ApiError::bad_request("Coupon usage limit reached"));
        }

        let used_count = match self.store.try_increment_usage(coupon_id).await {
            Ok(Some(count)) => count,
            Ok(None) => {
                debug!("Coupon {} ran out of uses concurrently", coupon_id);
                return Err(ApiError::bad_request("Coupon usage limit reached"));
            }
            Err(e) => {
                error!("Failed to count use of coupon {}: {:#}", coupon_id, e);
                return Ok((Redemption::unrecorded(), None));
            }
        };

        let store = self.store.clone();
        let usage = NewUsage {
            coupon_id,
            user_id,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
        };
        let handle = tokio::spawn(async move {
            if let Err(e) = store.insert_usage(&usage).await {
                warn!("Failed to write usage row for coupon {}: {:#}", usage.coupon_id, e);
            }
        });

        Ok((
            Redemption {
                coupon_id: Some(coupon_id),
                used_count: Some(used_count),
                affiliate_url: availability.affiliate_url,
                recorded: true,
            },
            Some(handle),
        ))
    }
}

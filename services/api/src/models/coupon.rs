//! Coupon models

use chrono::{DateTime, Utc};
use common::{http::PageParams, validation::validate_not_blank};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "coupon_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType {
    #[default]
    CouponCode,
    Deal,
    FreeShipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "discount_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    #[default]
    Percentage,
    FixedAmount,
    FreeShipping,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub coupon_type: CouponType,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub min_order_value: Option<f64>,
    pub max_discount: Option<f64>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub affiliate_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_exclusive: bool,
    pub is_sponsored: bool,
    pub sponsor_weight: i32,
    pub brand_id: Uuid,
    pub category_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Coupon joined with the names needed to render a card
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CouponView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub coupon: Coupon,
    pub brand_name: String,
    pub brand_slug: String,
    pub brand_logo_url: Option<String>,
    pub category_name: String,
    pub category_slug: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_coupon_request", skip_on_field_errors = false))]
pub struct CreateCouponRequest {
    #[validate(
        length(min = 1, max = 200, message = "Title must be 1 to 200 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[serde(default)]
    pub coupon_type: CouponType,
    #[serde(default)]
    pub discount_type: DiscountType,
    #[validate(range(min = 0.0, message = "Discount value cannot be negative"))]
    #[serde(default)]
    pub discount_value: f64,
    #[validate(range(min = 0.0))]
    pub min_order_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_discount: Option<f64>,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(url(message = "Affiliate URL must be a valid URL"))]
    pub affiliate_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_exclusive: Option<bool>,
    pub is_sponsored: Option<bool>,
    #[validate(range(min = 0, max = 1000))]
    pub sponsor_weight: Option<i32>,
    pub brand_id: Uuid,
    pub category_id: Uuid,
}

/// Partial update; absent fields are left as they are
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_coupon_update", skip_on_field_errors = false))]
pub struct CouponUpdate {
    #[validate(
        length(min = 1, max = 200, message = "Title must be 1 to 200 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    pub coupon_type: Option<CouponType>,
    pub discount_type: Option<DiscountType>,
    #[validate(range(min = 0.0, message = "Discount value cannot be negative"))]
    pub discount_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub min_order_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_discount: Option<f64>,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(url(message = "Affiliate URL must be a valid URL"))]
    pub affiliate_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_exclusive: Option<bool>,
    pub is_sponsored: Option<bool>,
    #[validate(range(min = 0, max = 1000))]
    pub sponsor_weight: Option<i32>,
    pub brand_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

fn schema_error(message: &'static str) -> ValidationError {
    let mut error = ValidationError::new("coupon");
    error.message = Some(Cow::Borrowed(message));
    error
}

fn check_coupon_terms(
    discount_type: Option<DiscountType>,
    discount_value: Option<f64>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    if let (Some(DiscountType::Percentage), Some(value)) = (discount_type, discount_value) {
        if value > 100.0 {
            return Err(schema_error("A percentage discount cannot exceed 100"));
        }
    }
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if until <= from {
            return Err(schema_error("validUntil must be after validFrom"));
        }
    }
    Ok(())
}

fn validate_coupon_request(request: &CreateCouponRequest) -> Result<(), ValidationError> {
    check_coupon_terms(
        Some(request.discount_type),
        Some(request.discount_value),
        request.valid_from,
        request.valid_until,
    )
}

fn validate_coupon_update(update: &CouponUpdate) -> Result<(), ValidationError> {
    check_coupon_terms(
        update.discount_type,
        update.discount_value,
        update.valid_from,
        update.valid_until,
    )
}

/// Row about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoupon {
    pub title: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub coupon_type: CouponType,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub min_order_value: Option<f64>,
    pub max_discount: Option<f64>,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub affiliate_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_exclusive: bool,
    pub is_sponsored: bool,
    pub sponsor_weight: i32,
    pub brand_id: Uuid,
    pub category_id: Uuid,
}

impl From<CreateCouponRequest> for NewCoupon {
    fn from(request: CreateCouponRequest) -> Self {
        Self {
            title: request.title.trim().to_string(),
            description: request.description,
            code: request.code,
            coupon_type: request.coupon_type,
            discount_type: request.discount_type,
            discount_value: request.discount_value,
            min_order_value: request.min_order_value,
            max_discount: request.max_discount,
            usage_limit: request.usage_limit,
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            affiliate_url: request.affiliate_url,
            is_active: request.is_active.unwrap_or(true),
            is_verified: request.is_verified.unwrap_or(false),
            is_exclusive: request.is_exclusive.unwrap_or(false),
            is_sponsored: request.is_sponsored.unwrap_or(false),
            sponsor_weight: request.sponsor_weight.unwrap_or(0),
            brand_id: request.brand_id,
            category_id: request.category_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub brand_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub search: Option<String>,
    /// Honoured for administrators only
    pub include_inactive: Option<bool>,
}

impl CouponListQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request() -> CreateCouponRequest {
        serde_json::from_value(serde_json::json!({
            "title": "10% off shoes",
            "discountType": "PERCENTAGE",
            "discountValue": 10,
            "brandId": Uuid::new_v4(),
            "categoryId": Uuid::new_v4(),
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_apply() {
        let coupon = NewCoupon::from(request());
        assert_eq!(coupon.coupon_type, CouponType::CouponCode);
        assert!(coupon.is_active);
        assert!(!coupon.is_verified);
    }

    #[test]
    fn test_percentage_over_100_is_rejected() {
        let mut coupon = request();
        coupon.discount_value = 150.0;
        assert!(coupon.validate().is_err());

        coupon.discount_type = DiscountType::FixedAmount;
        assert!(coupon.validate().is_ok());
    }

    #[test]
    fn test_validity_window_must_be_ordered() {
        let now = Utc::now();
        let update = CouponUpdate {
            valid_from: Some(now),
            valid_until: Some(now - Duration::days(1)),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_unknown_enum_value_fails_to_parse() {
        let parsed = serde_json::from_value::<CouponUpdate>(
            serde_json::json!({ "couponType": "MYSTERY" }),
        );
        assert!(parsed.is_err());
    }
}

//! User submissions awaiting moderation

use chrono::{DateTime, Utc};
use common::http::PageParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{CouponType, DiscountType};

/// Largest accepted payload once serialized
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "submission_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionType {
    Brand,
    Coupon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "submission_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    /// Only pending submissions move, and only to a decision
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (SubmissionStatus::Pending, SubmissionStatus::Approved)
                | (SubmissionStatus::Pending, SubmissionStatus::Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        self != SubmissionStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub submission_type: SubmissionType,
    pub payload: Value,
    pub status: SubmissionStatus,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_submission", skip_on_field_errors = false))]
pub struct CreateSubmissionRequest {
    #[serde(rename = "type")]
    pub submission_type: SubmissionType,
    pub payload: Value,
}

fn payload_error(message: &'static str) -> ValidationError {
    let mut error = ValidationError::new("payload");
    error.message = Some(Cow::Borrowed(message));
    error
}

fn has_text(payload: &Value, field: &str) -> bool {
    payload
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|value| !value.trim().is_empty())
}

fn validate_submission(request: &CreateSubmissionRequest) -> Result<(), ValidationError> {
    if !request.payload.is_object() {
        return Err(payload_error("Payload must be a JSON object"));
    }
    if request.payload.to_string().len() > MAX_PAYLOAD_BYTES {
        return Err(payload_error("Payload is too large"));
    }
    match request.submission_type {
        SubmissionType::Brand if !has_text(&request.payload, "name") => {
            Err(payload_error("A brand submission needs a name"))
        }
        SubmissionType::Coupon if !has_text(&request.payload, "title") => {
            Err(payload_error("A coupon submission needs a title"))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SubmissionListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<SubmissionStatus>,
    #[serde(rename = "type")]
    pub submission_type: Option<SubmissionType>,
}

impl SubmissionListQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// `PATCH /submissions` body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmissionPatch {
    pub id: Uuid,
    #[serde(flatten)]
    pub action: SubmissionAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum SubmissionAction {
    /// Decide a pending submission
    Status { status: SubmissionStatus },
    /// Promote the payload into a draft brand or coupon
    Move {
        status: Option<SubmissionStatus>,
        #[serde(rename = "categoryId")]
        category_id: Option<Uuid>,
    },
}

/// Fields read from a BRAND payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
}

/// Fields read from a COUPON payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub coupon_type: Option<CouponType>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<f64>,
    pub affiliate_url: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub brand_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_machine() {
        use SubmissionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
        assert!(Approved.is_terminal());
    }

    #[test]
    fn test_patch_actions_parse() {
        let id = Uuid::new_v4();
        let status: SubmissionPatch =
            serde_json::from_value(json!({ "id": id, "action": "status", "status": "APPROVED" }))
                .unwrap();
        assert_eq!(
            status.action,
            SubmissionAction::Status {
                status: SubmissionStatus::Approved
            }
        );

        let category = Uuid::new_v4();
        let moved: SubmissionPatch =
            serde_json::from_value(json!({ "id": id, "action": "move", "categoryId": category }))
                .unwrap();
        assert_eq!(
            moved.action,
            SubmissionAction::Move {
                status: None,
                category_id: Some(category)
            }
        );

        assert!(
            serde_json::from_value::<SubmissionPatch>(json!({ "id": id, "action": "delete" }))
                .is_err()
        );
    }

    #[test]
    fn test_payload_requirements() {
        let brand = CreateSubmissionRequest {
            submission_type: SubmissionType::Brand,
            payload: json!({ "name": "  " }),
        };
        assert!(brand.validate().is_err());

        let coupon = CreateSubmissionRequest {
            submission_type: SubmissionType::Coupon,
            payload: json!({ "title": "Free delivery" }),
        };
        assert!(coupon.validate().is_ok());

        let not_object = CreateSubmissionRequest {
            submission_type: SubmissionType::Coupon,
            payload: json!(["title"]),
        };
        assert!(not_object.validate().is_err());
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let request = CreateSubmissionRequest {
            submission_type: SubmissionType::Brand,
            payload: json!({ "name": "Acme", "description": "x".repeat(MAX_PAYLOAD_BYTES) }),
        };
        assert!(request.validate().is_err());
    }
}

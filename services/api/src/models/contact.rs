//! Contact and partnership requests

use chrono::{DateTime, Utc};
use common::{http::PageParams, validation::validate_not_blank};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "contact_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactType {
    Contact,
    Partner,
}

/// Stored request; never edited after creation
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactSubmission {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub submission_type: ContactType,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_contact", skip_on_field_errors = false))]
pub struct ContactRequest {
    #[serde(rename = "type")]
    pub submission_type: ContactType,
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 100))]
    pub company: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[validate(length(
        min = 10,
        max = 5000,
        message = "Message must be 10 to 5000 characters"
    ))]
    pub message: String,
}

fn validate_contact(request: &ContactRequest) -> Result<(), ValidationError> {
    let has_company = request
        .company
        .as_deref()
        .is_some_and(|company| !company.trim().is_empty());
    if request.submission_type == ContactType::Partner && !has_company {
        let mut error = ValidationError::new("company");
        error.message = Some(Cow::Borrowed("Partnership requests must name a company"));
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ContactListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub submission_type: Option<ContactType>,
}

impl ContactListQuery {
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

    fn request(kind: ContactType, company: Option<&str>) -> ContactRequest {
        ContactRequest {
            submission_type: kind,
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
            company: company.map(str::to_string),
            phone: None,
            subject: None,
            message: "We would like to list our deals".to_string(),
        }
    }

    #[test]
    fn test_partner_needs_company() {
        assert!(request(ContactType::Partner, None).validate().is_err());
        assert!(request(ContactType::Partner, Some("Acme")).validate().is_ok());
        assert!(request(ContactType::Contact, None).validate().is_ok());
    }

    #[test]
    fn test_short_message_is_rejected() {
        let mut contact = request(ContactType::Contact, None);
        contact.message = "hi".to_string();
        assert!(contact.validate().is_err());
    }
}

//! User and contact submission repositories

use anyhow::Result;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{
    ContactListQuery, ContactRequest, ContactSubmission, Submission, SubmissionListQuery,
    SubmissionStatus, SubmissionType,
};

const SUBMISSION_COLUMNS: &str =
    "id, submission_type, payload, status, user_id, created_at, updated_at";

const CONTACT_COLUMNS: &str =
    "id, submission_type, name, email, company, phone, subject, message, created_at";

#[derive(Clone)]
pub struct SubmissionRepository {
    pool: PgPool,
}

impl SubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        submission_type: SubmissionType,
        payload: &Value,
        user_id: Option<Uuid>,
    ) -> Result<Submission> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "INSERT INTO user_submissions (submission_type, payload, user_id) \
             VALUES ($1, $2, $3) RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_type)
        .bind(payload)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(submission)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "SELECT {} FROM user_submissions WHERE id = $1",
            SUBMISSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(submission)
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &SubmissionListQuery) {
        builder.push(" WHERE TRUE");
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(submission_type) = query.submission_type {
            builder.push(" AND submission_type = ").push_bind(submission_type);
        }
    }

    /// Newest first
    pub async fn list(&self, query: &SubmissionListQuery) -> Result<(Vec<Submission>, i64)> {
        let page = query.page_params();

        let mut select =
            QueryBuilder::new(format!("SELECT {} FROM user_submissions", SUBMISSION_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let submissions = select
            .build_query_as::<Submission>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM user_submissions");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((submissions, total))
    }

    /// Compare-and-set on the status column
    pub async fn update_status(
        &self,
        id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "UPDATE user_submissions SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(submission)
    }
}

#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, request: &ContactRequest) -> Result<ContactSubmission> {
        let contact = sqlx::query_as::<_, ContactSubmission>(&format!(
            r#"
            INSERT INTO contact_submissions
                (submission_type, name, email, company, phone, subject, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            CONTACT_COLUMNS
        ))
        .bind(request.submission_type)
        .bind(request.name.trim())
        .bind(request.email.trim().to_lowercase())
        .bind(&request.company)
        .bind(&request.phone)
        .bind(&request.subject)
        .bind(&request.message)
        .fetch_one(&self.pool)
        .await?;
        Ok(contact)
    }

    /// Newest first
    pub async fn list(&self, query: &ContactListQuery) -> Result<(Vec<ContactSubmission>, i64)> {
        let page = query.page_params();

        let contacts = sqlx::query_as::<_, ContactSubmission>(&format!(
            "SELECT {} FROM contact_submissions \
             WHERE ($1::contact_type IS NULL OR submission_type = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            CONTACT_COLUMNS
        ))
        .bind(query.submission_type)
        .bind(i64::from(page.limit()))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contact_submissions \
             WHERE ($1::contact_type IS NULL OR submission_type = $1)",
        )
        .bind(query.submission_type)
        .fetch_one(&self.pool)
        .await?;

        Ok((contacts, total))
    }
}

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::DomainSubmissionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    TaxSubmission,
    PermitApplication,
    BusinessLicense,
    BillPayment,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::TaxSubmission => "TAX_SUBMISSION",
            SubmissionKind::PermitApplication => "PERMIT_APPLICATION",
            SubmissionKind::BusinessLicense => "BUSINESS_LICENSE",
            SubmissionKind::BillPayment => "BILL_PAYMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    PendingPayment,
    Submitted,
    PaymentFailed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::PendingPayment => "pending_payment",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::PaymentFailed => "payment_failed",
        }
    }
}

fn unknown_value(column: &str, value: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::Unknown {
        message: format!("unknown {}: {}", column, value),
    })
}

impl FromStr for SubmissionKind {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "TAX_SUBMISSION" => Ok(SubmissionKind::TaxSubmission),
            "PERMIT_APPLICATION" => Ok(SubmissionKind::PermitApplication),
            "BUSINESS_LICENSE" => Ok(SubmissionKind::BusinessLicense),
            "BILL_PAYMENT" => Ok(SubmissionKind::BillPayment),
            other => Err(unknown_value("submission kind", other)),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(unknown_value("payment status", other)),
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(SubmissionStatus::Draft),
            "pending_payment" => Ok(SubmissionStatus::PendingPayment),
            "submitted" => Ok(SubmissionStatus::Submitted),
            "payment_failed" => Ok(SubmissionStatus::PaymentFailed),
            other => Err(unknown_value("submission status", other)),
        }
    }
}

/// Tax filing, permit, license or bill that a payment settles
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSubmission {
    pub id: Uuid,
    pub kind: SubmissionKind,
    pub domain_entity_id: String,
    pub user_id: Uuid,
    pub merchant_id: Uuid,
    pub payment_history_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub submission_status: SubmissionStatus,
    pub details: JsonValue,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainSubmission {
    /// A submission awaiting the outcome of its first payment attempt
    pub fn awaiting_payment(
        kind: SubmissionKind,
        domain_entity_id: &str,
        user_id: Uuid,
        merchant_id: Uuid,
        details: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            domain_entity_id: domain_entity_id.to_string(),
            user_id,
            merchant_id,
            payment_history_id: None,
            payment_status: PaymentStatus::Pending,
            submission_status: SubmissionStatus::PendingPayment,
            details,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, FromRow)]
struct DomainSubmissionRow {
    id: Uuid,
    kind: String,
    domain_entity_id: String,
    user_id: Uuid,
    merchant_id: Uuid,
    payment_history_id: Option<Uuid>,
    payment_status: String,
    submission_status: String,
    details: JsonValue,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DomainSubmissionRow {
    fn into_entity(self) -> Result<DomainSubmission, DatabaseError> {
        Ok(DomainSubmission {
            id: self.id,
            kind: self.kind.parse()?,
            domain_entity_id: self.domain_entity_id,
            user_id: self.user_id,
            merchant_id: self.merchant_id,
            payment_history_id: self.payment_history_id,
            payment_status: self.payment_status.parse()?,
            submission_status: self.submission_status.parse()?,
            details: self.details,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SUBMISSION_COLUMNS: &str = "id, kind, domain_entity_id, user_id, merchant_id,
    payment_history_id, payment_status, submission_status, details, paid_at,
    created_at, updated_at";

pub struct DomainSubmissionRepository {
    pool: PgPool,
}

impl DomainSubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainSubmissionStore for DomainSubmissionRepository {
    async fn insert(&self, submission: &DomainSubmission) -> Result<DomainSubmission, DatabaseError> {
        let query = format!(
            "INSERT INTO domain_submissions
             (id, kind, domain_entity_id, user_id, merchant_id, payment_history_id,
              payment_status, submission_status, details, paid_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {SUBMISSION_COLUMNS}"
        );

        let row = sqlx::query_as::<_, DomainSubmissionRow>(&query)
            .bind(submission.id)
            .bind(submission.kind.as_str())
            .bind(&submission.domain_entity_id)
            .bind(submission.user_id)
            .bind(submission.merchant_id)
            .bind(submission.payment_history_id)
            .bind(submission.payment_status.as_str())
            .bind(submission.submission_status.as_str())
            .bind(&submission.details)
            .bind(submission.paid_at)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.into_entity()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DomainSubmission>, DatabaseError> {
        let query = format!("SELECT {SUBMISSION_COLUMNS} FROM domain_submissions WHERE id = $1");
        let row = sqlx::query_as::<_, DomainSubmissionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.map(DomainSubmissionRow::into_entity).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM domain_submissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn link_payment(&self, id: Uuid, payment_history_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE domain_submissions SET payment_history_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(payment_history_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("domain_submission", id));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
        submission_status: SubmissionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<DomainSubmission, DatabaseError> {
        let query = format!(
            "UPDATE domain_submissions
             SET payment_status = $2, submission_status = $3, paid_at = COALESCE($4, paid_at),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {SUBMISSION_COLUMNS}"
        );

        let row = sqlx::query_as::<_, DomainSubmissionRow>(&query)
            .bind(id)
            .bind(payment_status.as_str())
            .bind(submission_status.as_str())
            .bind(paid_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.ok_or_else(|| DatabaseError::not_found("domain_submission", id))?
            .into_entity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_submission_awaits_payment() {
        let submission = DomainSubmission::awaiting_payment(
            SubmissionKind::PermitApplication,
            "permit-77",
            Uuid::new_v4(),
            Uuid::new_v4(),
            serde_json::json!({"parcel": "12-A"}),
        );
        assert_eq!(submission.payment_status, PaymentStatus::Pending);
        assert_eq!(submission.submission_status, SubmissionStatus::PendingPayment);
        assert!(submission.payment_history_id.is_none());
        assert!(submission.paid_at.is_none());
    }

    #[test]
    fn status_columns_parse_back() {
        for status in [
            SubmissionStatus::Draft,
            SubmissionStatus::PendingPayment,
            SubmissionStatus::Submitted,
            SubmissionStatus::PaymentFailed,
        ] {
            assert_eq!(status.as_str().parse::<SubmissionStatus>().unwrap(), status);
        }
        assert_eq!("paid".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn kinds_parse_from_wire_names() {
        assert_eq!(
            "BUSINESS_LICENSE".parse::<SubmissionKind>().unwrap(),
            SubmissionKind::BusinessLicense
        );
    }
}

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::PaymentHistoryStore;
use crate::payments::types::TransferState;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Ledger row for one payment attempt, unique per `idempotency_id`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryRecord {
    pub id: Uuid,
    pub idempotency_id: String,
    pub user_id: Uuid,
    pub instrument_id: Uuid,
    pub merchant_id: Uuid,
    pub domain_submission_id: Uuid,
    pub base_amount_cents: i64,
    pub service_fee_cents: i64,
    pub total_amount_cents: i64,
    pub currency: String,
    pub transfer_state: TransferState,
    pub external_transfer_id: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    #[serde(skip_serializing)]
    pub raw_response: Option<JsonValue>,
    #[serde(skip_serializing)]
    pub request_fingerprint: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentHistoryRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        idempotency_id: &str,
        user_id: Uuid,
        instrument_id: Uuid,
        merchant_id: Uuid,
        domain_submission_id: Uuid,
        base_amount_cents: i64,
        total_amount_cents: i64,
        currency: &str,
        request_fingerprint: &str,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_id: idempotency_id.to_string(),
            user_id,
            instrument_id,
            merchant_id,
            domain_submission_id,
            base_amount_cents,
            service_fee_cents: total_amount_cents - base_amount_cents,
            total_amount_cents,
            currency: currency.to_string(),
            transfer_state: TransferState::Pending,
            external_transfer_id: None,
            failure_code: None,
            failure_message: None,
            raw_response: None,
            request_fingerprint: request_fingerprint.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, outcome: &OutcomeUpdate) {
        self.transfer_state = outcome.transfer_state;
        self.external_transfer_id = outcome.external_transfer_id.clone();
        self.failure_code = outcome.failure_code.clone();
        self.failure_message = outcome.failure_message.clone();
        self.raw_response = outcome.raw_response.clone();
        self.updated_at = chrono::Utc::now();
    }
}

/// Terminal outcome written to a PENDING ledger row
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeUpdate {
    pub transfer_state: TransferState,
    pub external_transfer_id: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub raw_response: Option<JsonValue>,
}

#[derive(Debug, FromRow)]
struct PaymentHistoryRow {
    id: Uuid,
    idempotency_id: String,
    user_id: Uuid,
    instrument_id: Uuid,
    merchant_id: Uuid,
    domain_submission_id: Uuid,
    base_amount_cents: i64,
    service_fee_cents: i64,
    total_amount_cents: i64,
    currency: String,
    transfer_state: String,
    external_transfer_id: Option<String>,
    failure_code: Option<String>,
    failure_message: Option<String>,
    raw_response: Option<JsonValue>,
    request_fingerprint: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentHistoryRow {
    fn into_entity(self) -> Result<PaymentHistoryRecord, DatabaseError> {
        let transfer_state = self.transfer_state.parse::<TransferState>().map_err(|_| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown transfer state: {}", self.transfer_state),
            })
        })?;

        Ok(PaymentHistoryRecord {
            id: self.id,
            idempotency_id: self.idempotency_id,
            user_id: self.user_id,
            instrument_id: self.instrument_id,
            merchant_id: self.merchant_id,
            domain_submission_id: self.domain_submission_id,
            base_amount_cents: self.base_amount_cents,
            service_fee_cents: self.service_fee_cents,
            total_amount_cents: self.total_amount_cents,
            currency: self.currency,
            transfer_state,
            external_transfer_id: self.external_transfer_id,
            failure_code: self.failure_code,
            failure_message: self.failure_message,
            raw_response: self.raw_response,
            request_fingerprint: self.request_fingerprint,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const HISTORY_COLUMNS: &str = "id, idempotency_id, user_id, instrument_id, merchant_id,
    domain_submission_id, base_amount_cents, service_fee_cents, total_amount_cents, currency,
    transfer_state, external_transfer_id, failure_code, failure_message, raw_response,
    request_fingerprint, created_at, updated_at";

/// Postgres-backed payment ledger
pub struct PaymentHistoryRepository {
    pool: PgPool,
}

impl PaymentHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentHistoryStore for PaymentHistoryRepository {
    async fn find_by_idempotency_id(
        &self,
        idempotency_id: &str,
    ) -> Result<Option<PaymentHistoryRecord>, DatabaseError> {
        let query = format!("SELECT {HISTORY_COLUMNS} FROM payment_history WHERE idempotency_id = $1");
        let row = sqlx::query_as::<_, PaymentHistoryRow>(&query)
            .bind(idempotency_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentHistoryRow::into_entity).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentHistoryRecord>, DatabaseError> {
        let query = format!("SELECT {HISTORY_COLUMNS} FROM payment_history WHERE id = $1");
        let row = sqlx::query_as::<_, PaymentHistoryRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentHistoryRow::into_entity).transpose()
    }

    async fn insert(&self, record: &PaymentHistoryRecord) -> Result<PaymentHistoryRecord, DatabaseError> {
        let query = format!(
            "INSERT INTO payment_history
             (id, idempotency_id, user_id, instrument_id, merchant_id, domain_submission_id,
              base_amount_cents, service_fee_cents, total_amount_cents, currency, transfer_state,
              request_fingerprint)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {HISTORY_COLUMNS}"
        );

        let row = sqlx::query_as::<_, PaymentHistoryRow>(&query)
            .bind(record.id)
            .bind(&record.idempotency_id)
            .bind(record.user_id)
            .bind(record.instrument_id)
            .bind(record.merchant_id)
            .bind(record.domain_submission_id)
            .bind(record.base_amount_cents)
            .bind(record.service_fee_cents)
            .bind(record.total_amount_cents)
            .bind(&record.currency)
            .bind(record.transfer_state.as_str())
            .bind(&record.request_fingerprint)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.into_entity()
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &OutcomeUpdate,
    ) -> Result<PaymentHistoryRecord, DatabaseError> {
        let query = format!(
            "UPDATE payment_history
             SET transfer_state = $2, external_transfer_id = $3, failure_code = $4,
                 failure_message = $5, raw_response = $6, updated_at = NOW()
             WHERE id = $1 AND transfer_state = 'PENDING'
             RETURNING {HISTORY_COLUMNS}"
        );

        let row = sqlx::query_as::<_, PaymentHistoryRow>(&query)
            .bind(id)
            .bind(outcome.transfer_state.as_str())
            .bind(&outcome.external_transfer_id)
            .bind(&outcome.failure_code)
            .bind(&outcome.failure_message)
            .bind(&outcome.raw_response)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => row.into_entity(),
            None => match self.find_by_id(id).await? {
                Some(_) => Err(DatabaseError::new(DatabaseErrorKind::StaleState {
                    entity: "payment_history".to_string(),
                    id: id.to_string(),
                })),
                None => Err(DatabaseError::not_found("payment_history", id)),
            },
        }
    }
}

//! In-memory implementation of every storage trait
//!
//! Backs the integration suites. Mirrors the database rules the core relies
//! on: `idempotency_id` is unique across the ledger and outcomes apply only
//! to PENDING rows.

use crate::database::domain_submission_repository::{
    DomainSubmission, PaymentStatus, SubmissionStatus,
};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::instrument_repository::PaymentInstrument;
use crate::database::merchant_repository::MerchantAccount;
use crate::database::payment_history_repository::{OutcomeUpdate, PaymentHistoryRecord};
use crate::database::repository::{
    DomainSubmissionStore, InstrumentStore, MerchantStore, PaymentHistoryStore,
};
use crate::payments::types::TransferState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

const IDEMPOTENCY_CONSTRAINT: &str = "payment_history_idempotency_id_key";

#[derive(Default)]
pub struct InMemoryStore {
    instruments: RwLock<HashMap<Uuid, PaymentInstrument>>,
    merchants: RwLock<HashMap<Uuid, MerchantAccount>>,
    payment_history: RwLock<HashMap<Uuid, PaymentHistoryRecord>>,
    submissions: RwLock<HashMap<Uuid, DomainSubmission>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn payment_history_count(&self) -> usize {
        self.payment_history.read().await.len()
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    pub async fn all_payment_history(&self) -> Vec<PaymentHistoryRecord> {
        self.payment_history.read().await.values().cloned().collect()
    }

    pub async fn all_submissions(&self) -> Vec<DomainSubmission> {
        self.submissions.read().await.values().cloned().collect()
    }

    /// Seed an instrument; the payment core only reads them
    pub async fn insert_instrument(
        &self,
        instrument: &PaymentInstrument,
    ) -> Result<PaymentInstrument, DatabaseError> {
        let mut instruments = self.instruments.write().await;
        if instruments.contains_key(&instrument.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "payment_instruments_pkey".to_string(),
            }));
        }
        instruments.insert(instrument.id, instrument.clone());
        Ok(instrument.clone())
    }

    /// Seed a merchant and its fee schedule
    pub async fn insert_merchant(
        &self,
        merchant: &MerchantAccount,
    ) -> Result<MerchantAccount, DatabaseError> {
        let mut merchants = self.merchants.write().await;
        if merchants.contains_key(&merchant.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "merchants_pkey".to_string(),
            }));
        }
        merchants.insert(merchant.id, merchant.clone());
        Ok(merchant.clone())
    }
}

#[async_trait]
impl InstrumentStore for InMemoryStore {
    async fn find_instrument(&self, id: Uuid) -> Result<Option<PaymentInstrument>, DatabaseError> {
        Ok(self.instruments.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl MerchantStore for InMemoryStore {
    async fn find_merchant(&self, id: Uuid) -> Result<Option<MerchantAccount>, DatabaseError> {
        Ok(self.merchants.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl PaymentHistoryStore for InMemoryStore {
    async fn find_by_idempotency_id(
        &self,
        idempotency_id: &str,
    ) -> Result<Option<PaymentHistoryRecord>, DatabaseError> {
        Ok(self
            .payment_history
            .read()
            .await
            .values()
            .find(|record| record.idempotency_id == idempotency_id)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentHistoryRecord>, DatabaseError> {
        Ok(self.payment_history.read().await.get(&id).cloned())
    }

    async fn insert(&self, record: &PaymentHistoryRecord) -> Result<PaymentHistoryRecord, DatabaseError> {
        // Uniqueness is checked under the write lock, as the database
        // constraint would be.
        let mut ledger = self.payment_history.write().await;
        if ledger
            .values()
            .any(|existing| existing.idempotency_id == record.idempotency_id)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: IDEMPOTENCY_CONSTRAINT.to_string(),
            }));
        }
        if !self.submissions.read().await.contains_key(&record.domain_submission_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!(
                    "foreign key violation: domain submission {} does not exist",
                    record.domain_submission_id
                ),
            }));
        }
        ledger.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &OutcomeUpdate,
    ) -> Result<PaymentHistoryRecord, DatabaseError> {
        let mut ledger = self.payment_history.write().await;
        let record = ledger
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("payment_history", id))?;

        if record.transfer_state != TransferState::Pending {
            return Err(DatabaseError::new(DatabaseErrorKind::StaleState {
                entity: "payment_history".to_string(),
                id: id.to_string(),
            }));
        }

        record.apply(outcome);
        Ok(record.clone())
    }
}

#[async_trait]
impl DomainSubmissionStore for InMemoryStore {
    async fn insert(&self, submission: &DomainSubmission) -> Result<DomainSubmission, DatabaseError> {
        let mut submissions = self.submissions.write().await;
        if submissions.contains_key(&submission.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "domain_submissions_pkey".to_string(),
            }));
        }
        submissions.insert(submission.id, submission.clone());
        Ok(submission.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DomainSubmission>, DatabaseError> {
        Ok(self.submissions.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.submissions.write().await.remove(&id).is_some())
    }

    async fn link_payment(&self, id: Uuid, payment_history_id: Uuid) -> Result<(), DatabaseError> {
        let mut submissions = self.submissions.write().await;
        let submission = submissions
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("domain_submission", id))?;
        submission.payment_history_id = Some(payment_history_id);
        submission.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
        submission_status: SubmissionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<DomainSubmission, DatabaseError> {
        let mut submissions = self.submissions.write().await;
        let submission = submissions
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("domain_submission", id))?;

        submission.payment_status = payment_status;
        submission.submission_status = submission_status;
        if paid_at.is_some() {
            submission.paid_at = paid_at;
        }
        submission.updated_at = Utc::now();
        Ok(submission.clone())
    }
}

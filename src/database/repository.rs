//! Storage seams consumed by the payment core
//!
//! Instruments and merchants are owned elsewhere and only read here.
//! Each trait has a Postgres implementation in its own repository module and
//! an in-memory implementation in [`crate::database::memory`]. Implementations
//! must reject a second ledger row carrying an existing `idempotency_id` with
//! [`DatabaseErrorKind::UniqueViolation`](crate::database::error::DatabaseErrorKind).

use crate::database::domain_submission_repository::{
    DomainSubmission, PaymentStatus, SubmissionStatus,
};
use crate::database::error::DatabaseError;
use crate::database::instrument_repository::PaymentInstrument;
use crate::database::merchant_repository::MerchantAccount;
use crate::database::payment_history_repository::{OutcomeUpdate, PaymentHistoryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait InstrumentStore: Send + Sync {
    async fn find_instrument(&self, id: Uuid) -> Result<Option<PaymentInstrument>, DatabaseError>;
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    async fn find_merchant(&self, id: Uuid) -> Result<Option<MerchantAccount>, DatabaseError>;
}

/// Payment ledger. Rows are created PENDING and move to a terminal state once.
#[async_trait]
pub trait PaymentHistoryStore: Send + Sync {
    async fn find_by_idempotency_id(
        &self,
        idempotency_id: &str,
    ) -> Result<Option<PaymentHistoryRecord>, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentHistoryRecord>, DatabaseError>;

    async fn insert(&self, record: &PaymentHistoryRecord) -> Result<PaymentHistoryRecord, DatabaseError>;

    /// Apply a terminal outcome. Fails with `StaleState` if the row has
    /// already left PENDING.
    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &OutcomeUpdate,
    ) -> Result<PaymentHistoryRecord, DatabaseError>;
}

#[async_trait]
pub trait DomainSubmissionStore: Send + Sync {
    async fn insert(&self, submission: &DomainSubmission) -> Result<DomainSubmission, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DomainSubmission>, DatabaseError>;

    /// Remove a submission created by a workflow that could not complete.
    /// Returns whether a row was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;

    async fn link_payment(&self, id: Uuid, payment_history_id: Uuid) -> Result<(), DatabaseError>;

    async fn update_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
        submission_status: SubmissionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<DomainSubmission, DatabaseError>;
}

/// The four stores the orchestrator works against
#[derive(Clone)]
pub struct PaymentStores {
    pub instruments: Arc<dyn InstrumentStore>,
    pub merchants: Arc<dyn MerchantStore>,
    pub payment_history: Arc<dyn PaymentHistoryStore>,
    pub submissions: Arc<dyn DomainSubmissionStore>,
}

impl PaymentStores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        use crate::database::{
            domain_submission_repository::DomainSubmissionRepository,
            instrument_repository::InstrumentRepository, merchant_repository::MerchantRepository,
            payment_history_repository::PaymentHistoryRepository,
        };

        Self {
            instruments: Arc::new(InstrumentRepository::new(pool.clone())),
            merchants: Arc::new(MerchantRepository::new(pool.clone())),
            payment_history: Arc::new(PaymentHistoryRepository::new(pool.clone())),
            submissions: Arc::new(DomainSubmissionRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<crate::database::memory::InMemoryStore>) -> Self {
        Self {
            instruments: store.clone(),
            merchants: store.clone(),
            payment_history: store.clone(),
            submissions: store,
        }
    }
}

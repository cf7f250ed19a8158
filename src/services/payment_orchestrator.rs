//! Payment Submission Orchestrator
//!
//! Takes a payer's submission from request to reconciled ledger row:
//! authenticate, validate, short-circuit replays of a known idempotency key,
//! recompute fees server-side, create the pending records, call the processor
//! once, and hand the outcome to the reconciliation recorder.

use crate::database::domain_submission_repository::{DomainSubmission, SubmissionKind};
use crate::database::error::DatabaseError;
use crate::database::instrument_repository::PaymentInstrument;
use crate::database::merchant_repository::MerchantAccount;
use crate::database::payment_history_repository::PaymentHistoryRecord;
use crate::database::repository::PaymentStores;
use crate::error::{
    AppError, AppErrorKind, AuthError as AppAuthError, DomainError, InfrastructureError,
    ValidationError,
};
use crate::payments::error::GatewayError;
use crate::payments::gateway::TransferGateway;
use crate::payments::types::{TransferRequest, TransferResult, TransferState};
use crate::services::auth::{AuthContext, CallerIdentity};
use crate::services::fee_calculation::{FeeBreakdown, FeeCalculator, FeeError, PricingMethod};
use crate::services::idempotency::{request_fingerprint, IdempotencyKeyGenerator};
use crate::services::reconciliation::ReconciliationRecorder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MAX_FRAUD_SESSION_ID_LEN: usize = 255;
pub const MAX_DOMAIN_ENTITY_ID_LEN: usize = 128;

// ============================================================================
// Submission State Machine
// ============================================================================

/// Progress of one submission through the orchestrator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStage {
    /// Request accepted for processing
    Received,
    /// Caller, instrument, merchant and amounts checked
    Validated,
    /// Answered from an existing ledger row; no processor call
    Deduped,
    /// Domain submission and PENDING ledger row written
    PendingRecorded,
    /// Processor answered, failed or timed out
    GatewayCalled,
    /// Outcome written back
    Reconciled,
}

impl std::fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionStage::Received => write!(f, "RECEIVED"),
            SubmissionStage::Validated => write!(f, "VALIDATED"),
            SubmissionStage::Deduped => write!(f, "DEDUPED"),
            SubmissionStage::PendingRecorded => write!(f, "PENDING_RECORDED"),
            SubmissionStage::GatewayCalled => write!(f, "GATEWAY_CALLED"),
            SubmissionStage::Reconciled => write!(f, "RECONCILED"),
        }
    }
}

impl SubmissionStage {
    pub fn valid_transitions(&self) -> Vec<SubmissionStage> {
        match self {
            SubmissionStage::Received => vec![SubmissionStage::Validated],
            SubmissionStage::Validated => {
                vec![SubmissionStage::Deduped, SubmissionStage::PendingRecorded]
            }
            SubmissionStage::PendingRecorded => vec![SubmissionStage::GatewayCalled],
            SubmissionStage::GatewayCalled => vec![SubmissionStage::Reconciled],
            SubmissionStage::Deduped | SubmissionStage::Reconciled => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStage::Deduped | SubmissionStage::Reconciled)
    }
}

/// Tracks and logs stage transitions for one submission
#[derive(Debug)]
struct StageTracker {
    idempotency_id: String,
    stage: SubmissionStage,
}

impl StageTracker {
    fn new(idempotency_id: &str) -> Self {
        Self {
            idempotency_id: idempotency_id.to_string(),
            stage: SubmissionStage::Received,
        }
    }

    fn advance(&mut self, target: SubmissionStage) -> SubmissionResult<()> {
        if !self.stage.valid_transitions().contains(&target) {
            return Err(SubmissionError::InvalidStageTransition {
                from: self.stage,
                to: target,
            });
        }
        info!(
            idempotency_id = %self.idempotency_id,
            from_stage = %self.stage,
            to_stage = %target,
            terminal = target.is_terminal(),
            "Submission stage transitioned"
        );
        self.stage = target;
        Ok(())
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitPaymentRequest {
    pub idempotency_id: String,
    pub instrument_id: Uuid,
    pub merchant_id: Uuid,
    pub base_amount_cents: i64,
    /// Client-computed total; advisory only
    #[serde(default)]
    pub total_amount_cents: Option<i64>,
    #[serde(default)]
    pub fraud_session_id: Option<String>,
    pub submission_kind: SubmissionKind,
    pub domain_entity_id: String,
    #[serde(default)]
    pub details: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPaymentResponse {
    pub success: bool,
    pub payment_history_id: Uuid,
    pub domain_submission_id: Uuid,
    pub transfer_state: TransferState,
    pub deduplicated: bool,
    pub total_amount_cents: i64,
    pub service_fee_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PaymentFailure>,
}

impl SubmitPaymentResponse {
    fn from_record(record: &PaymentHistoryRecord, deduplicated: bool) -> Self {
        let error = (record.transfer_state == TransferState::Failed).then(|| PaymentFailure {
            code: record.failure_code.clone(),
            message: record.failure_message.clone(),
        });
        Self {
            success: record.transfer_state == TransferState::Succeeded,
            payment_history_id: record.id,
            domain_submission_id: record.domain_submission_id,
            transfer_state: record.transfer_state,
            deduplicated,
            total_amount_cents: record.total_amount_cents,
            service_fee_cents: record.service_fee_cents,
            error,
        }
    }
}

/// Ledger row plus its submission, as shown to the paying user
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub payment: PaymentHistoryRecord,
    pub submission: Option<DomainSubmission>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Error classes surfaced to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Validation,
    Authorization,
    Configuration,
    Calculation,
    Persistence,
    Gateway,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Instrument {instrument_id} not found")]
    InstrumentNotFound { instrument_id: Uuid },

    #[error("Invalid {field}: {reason}")]
    InvalidAmount {
        field: &'static str,
        amount: i64,
        reason: String,
    },

    #[error("Merchant {merchant_id} is not configured for payments")]
    MerchantNotConfigured { merchant_id: Uuid },

    #[error("Fee calculation failed: {0}")]
    FeeCalculation(#[from] FeeError),

    #[error("Payment processor error: {source}")]
    Gateway {
        source: GatewayError,
        payment_history_id: Uuid,
        domain_submission_id: Uuid,
    },

    #[error("Could not create payment records: {message}")]
    RecordCreation { message: String },

    #[error("Invalid request field {field}: {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    #[error("Idempotency key {idempotency_id} was already used for a different payment")]
    IdempotencyKeyReused { idempotency_id: String },

    #[error("Payment storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("Payment {idempotency_id} not found")]
    PaymentNotFound { idempotency_id: String },

    #[error("Invalid submission stage transition from {from} to {to}")]
    InvalidStageTransition {
        from: SubmissionStage,
        to: SubmissionStage,
    },
}

impl SubmissionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SubmissionError::Unauthorized { .. }
            | SubmissionError::InstrumentNotFound { .. }
            | SubmissionError::PaymentNotFound { .. } => ErrorCategory::Authorization,
            SubmissionError::InvalidAmount { .. }
            | SubmissionError::InvalidRequest { .. }
            | SubmissionError::IdempotencyKeyReused { .. } => ErrorCategory::Validation,
            SubmissionError::MerchantNotConfigured { .. } => ErrorCategory::Configuration,
            SubmissionError::FeeCalculation(_) => ErrorCategory::Calculation,
            SubmissionError::RecordCreation { .. }
            | SubmissionError::StorageUnavailable { .. }
            | SubmissionError::InvalidStageTransition { .. } => ErrorCategory::Persistence,
            SubmissionError::Gateway { .. } => ErrorCategory::Gateway,
        }
    }

    /// Processor failure code, `TIMEOUT` for timeouts
    pub fn gateway_code(&self) -> Option<&'static str> {
        match self {
            SubmissionError::Gateway { source, .. } => source.failure_code(),
            _ => None,
        }
    }

    fn storage_unavailable(err: DatabaseError) -> Self {
        SubmissionError::StorageUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<SubmissionError> for AppError {
    fn from(err: SubmissionError) -> Self {
        let kind = match err {
            SubmissionError::Unauthorized { reason } => {
                AppErrorKind::Auth(AppAuthError::Unauthenticated { reason })
            }
            SubmissionError::InstrumentNotFound { instrument_id } => {
                AppErrorKind::Domain(DomainError::InstrumentNotFound {
                    instrument_id: instrument_id.to_string(),
                })
            }
            SubmissionError::InvalidAmount { amount, reason, .. } => {
                AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason,
                })
            }
            SubmissionError::MerchantNotConfigured { merchant_id } => {
                AppErrorKind::Domain(DomainError::MerchantNotConfigured {
                    merchant_id: merchant_id.to_string(),
                })
            }
            SubmissionError::FeeCalculation(fee_err) => return AppError::from(fee_err),
            SubmissionError::Gateway {
                source,
                payment_history_id,
                domain_submission_id,
            } => {
                return AppError::from(source).with_context(format!(
                    "paymentHistoryId={} domainSubmissionId={}",
                    payment_history_id, domain_submission_id
                ))
            }
            SubmissionError::RecordCreation { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::RecordCreation { message })
            }
            SubmissionError::InvalidRequest { field, reason } if field == "idempotencyId" => {
                AppErrorKind::Validation(ValidationError::InvalidIdempotencyKey { reason })
            }
            SubmissionError::InvalidRequest { field, reason } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.to_string(),
                    reason,
                })
            }
            SubmissionError::IdempotencyKeyReused { idempotency_id } => {
                AppErrorKind::Validation(ValidationError::IdempotencyKeyReused { idempotency_id })
            }
            SubmissionError::StorageUnavailable { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: true,
                })
            }
            SubmissionError::PaymentNotFound { idempotency_id } => {
                AppErrorKind::Domain(DomainError::PaymentNotFound { idempotency_id })
            }
            err @ SubmissionError::InvalidStageTransition { .. } => {
                AppErrorKind::Infrastructure(InfrastructureError::Internal {
                    message: err.to_string(),
                })
            }
        };
        AppError::new(kind)
    }
}

pub type SubmissionResult<T> = Result<T, SubmissionError>;

// ============================================================================
// Orchestrator
// ============================================================================

/// Everything `submit` checked before writing anything
struct ValidatedSubmission {
    caller: CallerIdentity,
    instrument: PaymentInstrument,
    merchant: MerchantAccount,
    merchant_processor_id: String,
    fingerprint: String,
}

pub struct PaymentOrchestrator {
    auth: Arc<dyn AuthContext>,
    stores: PaymentStores,
    gateway: Arc<dyn TransferGateway>,
    reconciler: ReconciliationRecorder,
}

impl PaymentOrchestrator {
    pub fn new(
        stores: PaymentStores,
        gateway: Arc<dyn TransferGateway>,
        auth: Arc<dyn AuthContext>,
    ) -> Self {
        let reconciler =
            ReconciliationRecorder::new(stores.payment_history.clone(), stores.submissions.clone());
        Self {
            auth,
            stores,
            gateway,
            reconciler,
        }
    }

    // =========================================================================
    // Fee Quotes
    // =========================================================================

    /// Display-only fee quote using the merchant's schedule
    pub async fn quote_fee(
        &self,
        merchant_id: Uuid,
        base_amount_cents: i64,
        method: PricingMethod,
    ) -> SubmissionResult<FeeBreakdown> {
        validate_amount("baseAmountCents", base_amount_cents)?;
        let merchant = self
            .stores
            .merchants
            .find_merchant(merchant_id)
            .await
            .map_err(SubmissionError::storage_unavailable)?
            .ok_or(SubmissionError::MerchantNotConfigured { merchant_id })?;

        Self::price(&merchant, base_amount_cents, method)
    }

    fn price(
        merchant: &MerchantAccount,
        base_amount_cents: i64,
        method: PricingMethod,
    ) -> SubmissionResult<FeeBreakdown> {
        let schedule =
            merchant
                .fee_schedule
                .as_ref()
                .ok_or_else(|| FeeError::InvalidFeeConfiguration {
                    reason: format!("merchant {} has no fee schedule", merchant.id),
                })?;
        FeeCalculator::calculate(base_amount_cents, method, schedule).map_err(|e| match e {
            FeeError::AmountOutOfRange { amount_cents } => SubmissionError::InvalidAmount {
                field: "baseAmountCents",
                amount: amount_cents,
                reason: "amount is too large to price".to_string(),
            },
            other => SubmissionError::FeeCalculation(other),
        })
    }

    // =========================================================================
    // Submission
    // =========================================================================

    pub async fn submit(
        &self,
        request: SubmitPaymentRequest,
        bearer_token: Option<&str>,
    ) -> SubmissionResult<SubmitPaymentResponse> {
        let mut stage = StageTracker::new(&request.idempotency_id);

        let validated = self.validate(&request, bearer_token).await?;
        stage.advance(SubmissionStage::Validated)?;

        // Step 1: a known key is answered from the ledger
        if let Some(existing) = self
            .stores
            .payment_history
            .find_by_idempotency_id(&request.idempotency_id)
            .await
            .map_err(SubmissionError::storage_unavailable)?
        {
            return self.replay(existing, &validated.fingerprint, &mut stage);
        }

        // Step 2: authoritative fees
        let method = PricingMethod::from_instrument_type(validated.instrument.instrument_type);
        let fees = Self::price(&validated.merchant, request.base_amount_cents, method)?;
        if let Some(client_total) = request.total_amount_cents {
            if client_total != fees.total_amount_to_charge_cents {
                warn!(
                    idempotency_id = %request.idempotency_id,
                    client_total_cents = client_total,
                    server_total_cents = fees.total_amount_to_charge_cents,
                    "client total differs from server fee calculation; using server total"
                );
            }
        }

        // Step 3: pending records
        let submission = DomainSubmission::awaiting_payment(
            request.submission_kind,
            &request.domain_entity_id,
            validated.caller.user_id,
            validated.merchant.id,
            request.details.clone().unwrap_or_else(|| serde_json::json!({})),
        );
        let submission = self
            .stores
            .submissions
            .insert(&submission)
            .await
            .map_err(|e| {
                error!(
                    idempotency_id = %request.idempotency_id,
                    error = %e,
                    "failed to create domain submission"
                );
                SubmissionError::RecordCreation {
                    message: e.to_string(),
                }
            })?;

        let pending = PaymentHistoryRecord::pending(
            &request.idempotency_id,
            validated.caller.user_id,
            validated.instrument.id,
            validated.merchant.id,
            submission.id,
            request.base_amount_cents,
            fees.total_amount_to_charge_cents,
            &validated.merchant.currency,
            &validated.fingerprint,
        );
        let record = match self.stores.payment_history.insert(&pending).await {
            Ok(record) => record,
            Err(e) => {
                self.compensate(submission.id, &request.idempotency_id).await;

                if e.is_unique_violation() {
                    // A concurrent request with the same key won the insert
                    let winner = self
                        .stores
                        .payment_history
                        .find_by_idempotency_id(&request.idempotency_id)
                        .await
                        .map_err(SubmissionError::storage_unavailable)?;
                    if let Some(winner) = winner {
                        return self.replay(winner, &validated.fingerprint, &mut stage);
                    }
                }

                error!(
                    idempotency_id = %request.idempotency_id,
                    base_amount_cents = request.base_amount_cents,
                    instrument_id = %validated.instrument.id,
                    merchant_id = %validated.merchant.id,
                    error = %e,
                    "failed to create payment history record"
                );
                return Err(SubmissionError::RecordCreation {
                    message: e.to_string(),
                });
            }
        };

        if let Err(e) = self
            .stores
            .submissions
            .link_payment(submission.id, record.id)
            .await
        {
            warn!(
                domain_submission_id = %submission.id,
                payment_history_id = %record.id,
                error = %e,
                "failed to link submission to payment history"
            );
        }
        stage.advance(SubmissionStage::PendingRecorded)?;

        // Step 4: one processor call
        let transfer = TransferRequest {
            merchant_external_id: validated.merchant_processor_id.clone(),
            currency: record.currency.clone(),
            amount_cents: record.total_amount_cents,
            source_token: validated.instrument.external_token.clone(),
            idempotency_id: record.idempotency_id.clone(),
            fraud_session_id: request.fraud_session_id.clone(),
        };
        let outcome = self.gateway.create_transfer(transfer).await;
        stage.advance(SubmissionStage::GatewayCalled)?;

        let (result, gateway_error) = match outcome {
            Ok(result) => (result, None),
            Err(e) => (synthetic_failure(&e), Some(e)),
        };

        // Step 5: reconcile exactly once
        let report = self.reconciler.record(&record, &result).await;
        stage.advance(SubmissionStage::Reconciled)?;

        if let Some(source) = gateway_error {
            error!(
                idempotency_id = %record.idempotency_id,
                total_amount_cents = record.total_amount_cents,
                instrument_id = %record.instrument_id,
                merchant_id = %record.merchant_id,
                failure_code = ?source.failure_code(),
                external_transfer_id = ?result.external_transfer_id,
                raw_response = %result.raw_response,
                outcome_unknown = source.outcome_unknown(),
                error = %source,
                "payment processor call failed"
            );
            if source.outcome_unknown() {
                error!(
                    payment_history_id = %record.id,
                    idempotency_id = %record.idempotency_id,
                    "processor outcome unknown; manual reconciliation required before retry"
                );
            }
            return Err(SubmissionError::Gateway {
                source,
                payment_history_id: record.id,
                domain_submission_id: record.domain_submission_id,
            });
        }

        if report.transfer_state != TransferState::Succeeded {
            error!(
                idempotency_id = %record.idempotency_id,
                total_amount_cents = record.total_amount_cents,
                instrument_id = %record.instrument_id,
                merchant_id = %record.merchant_id,
                failure_code = ?result.failure_code,
                raw_response = %result.raw_response,
                "payment processor did not complete transfer"
            );
        }

        let error = (report.transfer_state != TransferState::Succeeded).then(|| PaymentFailure {
            code: result.failure_code.clone(),
            message: result.failure_message.clone(),
        });

        Ok(SubmitPaymentResponse {
            success: report.transfer_state == TransferState::Succeeded,
            payment_history_id: record.id,
            domain_submission_id: record.domain_submission_id,
            transfer_state: report.transfer_state,
            deduplicated: false,
            total_amount_cents: record.total_amount_cents,
            service_fee_cents: record.service_fee_cents,
            error,
        })
    }

    /// Ledger row and submission for the caller's own payment
    pub async fn payment_status(
        &self,
        idempotency_id: &str,
        bearer_token: Option<&str>,
    ) -> SubmissionResult<PaymentStatusView> {
        let caller = self.authenticate(bearer_token).await?;
        IdempotencyKeyGenerator::validate(idempotency_id).map_err(|e| {
            SubmissionError::InvalidRequest {
                field: "idempotencyId",
                reason: e.to_string(),
            }
        })?;

        let payment = self
            .stores
            .payment_history
            .find_by_idempotency_id(idempotency_id)
            .await
            .map_err(SubmissionError::storage_unavailable)?
            .filter(|record| record.user_id == caller.user_id)
            .ok_or_else(|| SubmissionError::PaymentNotFound {
                idempotency_id: idempotency_id.to_string(),
            })?;

        let submission = self
            .stores
            .submissions
            .find_by_id(payment.domain_submission_id)
            .await
            .map_err(SubmissionError::storage_unavailable)?;

        Ok(PaymentStatusView {
            payment,
            submission,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn authenticate(&self, bearer_token: Option<&str>) -> SubmissionResult<CallerIdentity> {
        let token = bearer_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SubmissionError::Unauthorized {
                reason: "missing bearer token".to_string(),
            })?;

        self.auth.caller_identity(token).await.map_err(|e| {
            info!(error = %e, "rejected unauthenticated payment request");
            SubmissionError::Unauthorized {
                reason: e.to_string(),
            }
        })
    }

    async fn validate(
        &self,
        request: &SubmitPaymentRequest,
        bearer_token: Option<&str>,
    ) -> SubmissionResult<ValidatedSubmission> {
        let caller = self.authenticate(bearer_token).await?;

        IdempotencyKeyGenerator::validate(&request.idempotency_id).map_err(|e| {
            SubmissionError::InvalidRequest {
                field: "idempotencyId",
                reason: e.to_string(),
            }
        })?;
        validate_amount("baseAmountCents", request.base_amount_cents)?;
        if let Some(total) = request.total_amount_cents {
            validate_amount("totalAmountCents", total)?;
        }
        let entity = request.domain_entity_id.trim();
        if entity.is_empty() || entity.len() > MAX_DOMAIN_ENTITY_ID_LEN {
            return Err(SubmissionError::InvalidRequest {
                field: "domainEntityId",
                reason: format!("must be 1 to {} characters", MAX_DOMAIN_ENTITY_ID_LEN),
            });
        }
        if let Some(session) = &request.fraud_session_id {
            if session.len() > MAX_FRAUD_SESSION_ID_LEN {
                return Err(SubmissionError::InvalidRequest {
                    field: "fraudSessionId",
                    reason: format!("must be at most {} characters", MAX_FRAUD_SESSION_ID_LEN),
                });
            }
        }

        let instrument = self
            .stores
            .instruments
            .find_instrument(request.instrument_id)
            .await
            .map_err(SubmissionError::storage_unavailable)?
            .filter(|instrument| instrument.is_usable_by(&caller.user_id))
            .ok_or_else(|| {
                warn!(
                    instrument_id = %request.instrument_id,
                    user_id = %caller.user_id,
                    "instrument missing, disabled, or not owned by caller"
                );
                SubmissionError::InstrumentNotFound {
                    instrument_id: request.instrument_id,
                }
            })?;

        let merchant = self
            .stores
            .merchants
            .find_merchant(request.merchant_id)
            .await
            .map_err(SubmissionError::storage_unavailable)?
            .ok_or(SubmissionError::MerchantNotConfigured {
                merchant_id: request.merchant_id,
            })?;
        let merchant_processor_id = merchant
            .processor_identity()
            .map(str::to_string)
            .ok_or(SubmissionError::MerchantNotConfigured {
                merchant_id: merchant.id,
            })?;

        let fingerprint = request_fingerprint(
            &caller.user_id,
            &instrument.id,
            &merchant.id,
            request.base_amount_cents,
            &request.domain_entity_id,
        );

        Ok(ValidatedSubmission {
            caller,
            instrument,
            merchant,
            merchant_processor_id,
            fingerprint,
        })
    }

    fn replay(
        &self,
        existing: PaymentHistoryRecord,
        fingerprint: &str,
        stage: &mut StageTracker,
    ) -> SubmissionResult<SubmitPaymentResponse> {
        if existing.request_fingerprint != fingerprint {
            warn!(
                idempotency_id = %existing.idempotency_id,
                "idempotency key reused for a different payment"
            );
            return Err(SubmissionError::IdempotencyKeyReused {
                idempotency_id: existing.idempotency_id,
            });
        }

        stage.advance(SubmissionStage::Deduped)?;
        info!(
            idempotency_id = %existing.idempotency_id,
            payment_history_id = %existing.id,
            transfer_state = %existing.transfer_state,
            "returning stored outcome for replayed idempotency key"
        );
        Ok(SubmitPaymentResponse::from_record(&existing, true))
    }

    /// Remove a domain submission whose ledger row could not be written
    async fn compensate(&self, submission_id: Uuid, idempotency_id: &str) {
        match self.stores.submissions.delete(submission_id).await {
            Ok(_) => info!(
                domain_submission_id = %submission_id,
                idempotency_id = %idempotency_id,
                "removed domain submission after ledger insert failed"
            ),
            Err(e) => error!(
                domain_submission_id = %submission_id,
                idempotency_id = %idempotency_id,
                error = %e,
                "failed to remove orphaned domain submission; manual cleanup required"
            ),
        }
    }
}

fn validate_amount(field: &'static str, amount: i64) -> SubmissionResult<()> {
    if amount <= 0 {
        return Err(SubmissionError::InvalidAmount {
            field,
            amount,
            reason: "amount must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// FAILED result recorded when the processor gave no usable answer. Whatever
/// the processor did send is kept, including its transfer id.
fn synthetic_failure(err: &GatewayError) -> TransferResult {
    let raw_response = err
        .raw_response()
        .cloned()
        .unwrap_or_else(|| serde_json::json!({ "error": err.to_string() }));
    let external_transfer_id = raw_response
        .get("id")
        .and_then(JsonValue::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    TransferResult {
        external_transfer_id,
        state: TransferState::Failed,
        failure_code: err.failure_code().map(str::to_string),
        failure_message: Some(err.to_string()),
        raw_response,
    }
}

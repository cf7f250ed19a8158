//! Writes a transfer outcome onto the ledger row and its domain submission
//!
//! The ledger is updated first because it is the financial record. A failure
//! on either write is logged for manual follow-up and reported on the
//! [`ReconciliationReport`]; nothing is rolled back.

use crate::database::domain_submission_repository::{PaymentStatus, SubmissionStatus};
use crate::database::payment_history_repository::{OutcomeUpdate, PaymentHistoryRecord};
use crate::database::repository::{DomainSubmissionStore, PaymentHistoryStore};
use crate::payments::types::{TransferResult, TransferState};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    /// State written to the ledger (or intended, if the write failed)
    pub transfer_state: TransferState,
    pub ledger_updated: bool,
    pub submission_updated: bool,
    pub needs_manual_reconciliation: bool,
}

pub struct ReconciliationRecorder {
    payment_history: Arc<dyn PaymentHistoryStore>,
    submissions: Arc<dyn DomainSubmissionStore>,
}

impl ReconciliationRecorder {
    pub fn new(
        payment_history: Arc<dyn PaymentHistoryStore>,
        submissions: Arc<dyn DomainSubmissionStore>,
    ) -> Self {
        Self {
            payment_history,
            submissions,
        }
    }

    /// Only SUCCEEDED counts as paid. Every other processor state is recorded
    /// FAILED so the payer can retry with a new key.
    pub fn outcome_for(result: &TransferResult) -> OutcomeUpdate {
        if result.is_success() {
            OutcomeUpdate {
                transfer_state: TransferState::Succeeded,
                external_transfer_id: result.external_transfer_id.clone(),
                failure_code: None,
                failure_message: None,
                raw_response: Some(result.raw_response.clone()),
            }
        } else {
            OutcomeUpdate {
                transfer_state: TransferState::Failed,
                external_transfer_id: result.external_transfer_id.clone(),
                failure_code: result.failure_code.clone(),
                failure_message: result.failure_message.clone(),
                raw_response: Some(result.raw_response.clone()),
            }
        }
    }

    pub async fn record(
        &self,
        record: &PaymentHistoryRecord,
        result: &TransferResult,
    ) -> ReconciliationReport {
        let outcome = Self::outcome_for(result);
        let succeeded = outcome.transfer_state == TransferState::Succeeded;

        let ledger_updated = match self.payment_history.record_outcome(record.id, &outcome).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    payment_history_id = %record.id,
                    idempotency_id = %record.idempotency_id,
                    total_amount_cents = record.total_amount_cents,
                    instrument_id = %record.instrument_id,
                    merchant_id = %record.merchant_id,
                    transfer_state = %outcome.transfer_state,
                    external_transfer_id = ?outcome.external_transfer_id,
                    raw_response = %result.raw_response,
                    error = %e,
                    "ledger update failed after processor call; manual reconciliation required"
                );
                false
            }
        };

        let (payment_status, submission_status, paid_at) = if succeeded {
            (PaymentStatus::Paid, SubmissionStatus::Submitted, Some(Utc::now()))
        } else {
            (PaymentStatus::Failed, SubmissionStatus::PaymentFailed, None)
        };

        let submission_updated = match self
            .submissions
            .update_status(
                record.domain_submission_id,
                payment_status,
                submission_status,
                paid_at,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(
                    payment_history_id = %record.id,
                    domain_submission_id = %record.domain_submission_id,
                    idempotency_id = %record.idempotency_id,
                    transfer_state = %outcome.transfer_state,
                    error = %e,
                    "domain submission update failed; manual reconciliation required"
                );
                false
            }
        };

        let needs_manual_reconciliation = !(ledger_updated && submission_updated);
        if !needs_manual_reconciliation {
            info!(
                payment_history_id = %record.id,
                domain_submission_id = %record.domain_submission_id,
                transfer_state = %outcome.transfer_state,
                "payment reconciled"
            );
        }

        ReconciliationReport {
            transfer_state: outcome.transfer_state,
            ledger_updated,
            submission_updated,
            needs_manual_reconciliation,
        }
    }
}

//! Services module for business logic and integrations

pub mod auth;
pub mod fee_calculation;
pub mod idempotency;
pub mod payment_orchestrator;
pub mod reconciliation;

pub use crate::services::payment_orchestrator::{
    ErrorCategory, PaymentOrchestrator, PaymentStatusView, SubmissionError, SubmissionResult,
    SubmissionStage, SubmitPaymentRequest, SubmitPaymentResponse,
};

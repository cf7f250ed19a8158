//! Application error type for the payment API
//!
//! Layer errors (`FeeError`, `GatewayError`, `DatabaseError`, `SubmissionError`)
//! convert into [`AppError`], which carries the HTTP status, the machine
//! readable [`ErrorCode`] and the message shown to the payer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by the client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Request errors (4xx)
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "INVALID_IDEMPOTENCY_KEY")]
    InvalidIdempotencyKey,
    #[serde(rename = "IDEMPOTENCY_KEY_REUSED")]
    IdempotencyKeyReused,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "INSTRUMENT_NOT_FOUND")]
    InstrumentNotFound,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "MERCHANT_NOT_CONFIGURED")]
    MerchantNotConfigured,
    #[serde(rename = "FEE_CALCULATION_ERROR")]
    FeeCalculationError,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "RECORD_CREATION_ERROR")]
    RecordCreationError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // Processor errors (502, 504)
    #[serde(rename = "PAYMENT_PROCESSOR_ERROR")]
    PaymentProcessorError,
    #[serde(rename = "PROCESSOR_TIMEOUT")]
    ProcessorTimeout,

    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Payment rules the request broke
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Instrument missing, disabled, or owned by someone else
    InstrumentNotFound { instrument_id: String },
    /// No ledger row visible to the caller under this key
    PaymentNotFound { idempotency_id: String },
    /// Merchant missing or without a processor identity
    MerchantNotConfigured { merchant_id: String },
    /// Merchant fee schedule cannot price the amount
    FeeCalculation { reason: String },
}

#[derive(Debug, Clone)]
pub enum AuthError {
    Unauthenticated { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Pending records could not be written; nothing was charged
    RecordCreation { message: String },
    /// Missing or invalid configuration
    Configuration { message: String },
    /// Broken internal invariant
    Internal { message: String },
}

/// Payment processor errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProcessor {
        code: Option<String>,
        message: String,
        is_retryable: bool,
    },
    Timeout {
        service: String,
        timeout_secs: Option<u64>,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidAmount { amount: String, reason: String },
    InvalidIdempotencyKey { reason: String },
    /// Key already used for a different payment
    IdempotencyKeyReused { idempotency_id: String },
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Auth(AuthError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InstrumentNotFound { .. } => 404,
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::MerchantNotConfigured { .. } => 422,
                DomainError::FeeCalculation { .. } => 422,
            },
            AppErrorKind::Auth(_) => 401,
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProcessor { .. } => 502,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InstrumentNotFound { .. } => ErrorCode::InstrumentNotFound,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::MerchantNotConfigured { .. } => ErrorCode::MerchantNotConfigured,
                DomainError::FeeCalculation { .. } => ErrorCode::FeeCalculationError,
            },
            AppErrorKind::Auth(_) => ErrorCode::Unauthorized,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::RecordCreation { .. } => ErrorCode::RecordCreationError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Internal { .. } => ErrorCode::InternalError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProcessor { .. } => ErrorCode::PaymentProcessorError,
                ExternalError::Timeout { .. } => ErrorCode::ProcessorTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                ValidationError::InvalidIdempotencyKey { .. } => ErrorCode::InvalidIdempotencyKey,
                ValidationError::IdempotencyKeyReused { .. } => ErrorCode::IdempotencyKeyReused,
                ValidationError::InvalidField { .. } => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InstrumentNotFound { .. } => {
                    "Payment method not found or no longer available".to_string()
                }
                DomainError::PaymentNotFound { idempotency_id } => {
                    format!("Payment '{}' not found", idempotency_id)
                }
                DomainError::MerchantNotConfigured { .. } => {
                    "This service is not yet accepting online payments".to_string()
                }
                DomainError::FeeCalculation { .. } => {
                    "The service fee for this payment could not be calculated".to_string()
                }
            },
            AppErrorKind::Auth(_) => "Please sign in to continue".to_string(),
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::RecordCreation { .. } => {
                    "Your payment could not be started and you were not charged. Please try again"
                        .to_string()
                }
                _ => "Service temporarily unavailable. Please try again later".to_string(),
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProcessor { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment processor is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => match timeout_secs {
                    Some(secs) => format!(
                        "{} request timed out after {} seconds. Check your payment history before retrying",
                        service, secs
                    ),
                    None => format!(
                        "{} request timed out. Check your payment history before retrying",
                        service
                    ),
                },
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidIdempotencyKey { reason } => {
                    format!("Invalid idempotency key: {}", reason)
                }
                ValidationError::IdempotencyKeyReused { .. } => {
                    "This payment key was already used for a different payment".to_string()
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) | AppErrorKind::Auth(_) | AppErrorKind::Validation(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::RecordCreation { .. } => true,
                InfrastructureError::Configuration { .. } | InfrastructureError::Internal { .. } => {
                    false
                }
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProcessor { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError>, From<GatewayError> and From<SubmissionError> live next
// to their source types.

impl From<crate::services::fee_calculation::FeeError> for AppError {
    fn from(err: crate::services::fee_calculation::FeeError) -> Self {
        AppError::new(AppErrorKind::Domain(DomainError::FeeCalculation {
            reason: err.to_string(),
        }))
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

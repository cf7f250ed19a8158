use serde_json::Value as JsonValue;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure code recorded on the ledger when the processor does not answer in time
pub const TIMEOUT_FAILURE_CODE: &str = "TIMEOUT";

/// Failure code recorded when a 2xx reply could not be read as a transfer
pub const INVALID_RESPONSE_FAILURE_CODE: &str = "INVALID_RESPONSE";

/// Transport-level failures talking to the payment processor. A processor
/// that answers with a non-2xx status is not an error here: that is a FAILED
/// transfer result.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Processor request timed out: {message}")]
    Timeout { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    /// The processor accepted the request but its reply could not be read.
    /// The transfer may exist, so the reply is kept for the ledger.
    #[error("Invalid processor response: {message}")]
    InvalidResponse {
        message: String,
        status: u16,
        body: JsonValue,
    },

    #[error("Gateway configuration error: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    /// Code stored on the ledger row for this failure, if any
    pub fn failure_code(&self) -> Option<&'static str> {
        match self {
            GatewayError::Timeout { .. } => Some(TIMEOUT_FAILURE_CODE),
            GatewayError::InvalidResponse { .. } => Some(INVALID_RESPONSE_FAILURE_CODE),
            _ => None,
        }
    }

    /// Whether the processor may have created the transfer despite the error
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::InvalidResponse { .. }
        )
    }

    /// What the processor sent back, when it answered at all
    pub fn raw_response(&self) -> Option<&JsonValue> {
        match self {
            GatewayError::InvalidResponse { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Network { .. }
        )
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout {
                message: err.to_string(),
            }
        } else {
            GatewayError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        let kind = match &err {
            GatewayError::Timeout { .. } => ExternalError::Timeout {
                service: "Payment processor".to_string(),
                timeout_secs: None,
            },
            _ => ExternalError::PaymentProcessor {
                code: err.failure_code().map(str::to_string),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            },
        };
        AppError::new(AppErrorKind::External(kind))
    }
}

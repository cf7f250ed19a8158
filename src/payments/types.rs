use crate::payments::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

pub const SANDBOX_BASE_URL: &str = "https://finix.sandbox-payments-api.com";
pub const LIVE_BASE_URL: &str = "https://finix.live-payments-api.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Sandbox,
    Live,
}

impl GatewayEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => SANDBOX_BASE_URL,
            GatewayEnvironment::Live => LIVE_BASE_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "sandbox",
            GatewayEnvironment::Live => "live",
        }
    }
}

impl FromStr for GatewayEnvironment {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sandbox" | "test" => Ok(GatewayEnvironment::Sandbox),
            "live" | "production" => Ok(GatewayEnvironment::Live),
            _ => Err(GatewayError::Configuration {
                message: format!("unsupported processor environment: {}", value),
            }),
        }
    }
}

/// Transfer state as stored on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Pending,
    Succeeded,
    Failed,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "PENDING",
            TransferState::Succeeded => "SUCCEEDED",
            TransferState::Failed => "FAILED",
        }
    }

    /// Map a processor transfer state onto the ledger's three states.
    /// Anything the processor reports that is not a known state is FAILED.
    pub fn from_processor(state: &str) -> Self {
        match state.trim().to_uppercase().as_str() {
            "SUCCEEDED" => TransferState::Succeeded,
            "PENDING" => TransferState::Pending,
            _ => TransferState::Failed,
        }
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transfer state: {0}")]
pub struct UnknownTransferState(pub String);

impl FromStr for TransferState {
    type Err = UnknownTransferState;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(TransferState::Pending),
            "SUCCEEDED" => Ok(TransferState::Succeeded),
            "FAILED" => Ok(TransferState::Failed),
            other => Err(UnknownTransferState(other.to_string())),
        }
    }
}

/// Transfer creation request sent to the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub merchant_external_id: String,
    pub currency: String,
    pub amount_cents: i64,
    /// Tokenized instrument at the processor
    pub source_token: String,
    pub idempotency_id: String,
    pub fraud_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub external_transfer_id: Option<String>,
    pub state: TransferState,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub raw_response: JsonValue,
}

impl TransferResult {
    pub fn is_success(&self) -> bool {
        self.state == TransferState::Succeeded
    }
}

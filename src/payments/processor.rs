//! HTTP client for the card/ACH processor's transfer API

use crate::logging::mask_token;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::gateway::TransferGateway;
use crate::payments::types::{GatewayEnvironment, TransferRequest, TransferResult, TransferState};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_VERSION: &str = "2022-02-01";
const API_VERSION_HEADER: &str = "Finix-Version";
const TRANSFERS_PATH: &str = "/transfers";

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub environment: GatewayEnvironment,
    pub base_url: String,
    pub application_id: String,
    pub api_secret: String,
    pub timeout: Duration,
    pub api_version: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            environment: GatewayEnvironment::Sandbox,
            base_url: GatewayEnvironment::Sandbox.base_url().to_string(),
            application_id: String::new(),
            api_secret: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let environment = std::env::var("PROCESSOR_ENVIRONMENT")
            .unwrap_or_else(|_| "sandbox".to_string())
            .parse::<GatewayEnvironment>()?;

        let application_id = std::env::var("PROCESSOR_APPLICATION_ID").map_err(|_| {
            GatewayError::Configuration {
                message: "PROCESSOR_APPLICATION_ID environment variable is required".to_string(),
            }
        })?;
        let api_secret =
            std::env::var("PROCESSOR_API_SECRET").map_err(|_| GatewayError::Configuration {
                message: "PROCESSOR_API_SECRET environment variable is required".to_string(),
            })?;

        let config = Self {
            environment,
            base_url: std::env::var("PROCESSOR_BASE_URL")
                .unwrap_or_else(|_| environment.base_url().to_string()),
            application_id,
            api_secret,
            timeout: Duration::from_secs(
                std::env::var("PROCESSOR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            api_version: std::env::var("PROCESSOR_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.application_id.trim().is_empty() || self.api_secret.trim().is_empty() {
            return Err(GatewayError::Configuration {
                message: "processor credentials cannot be empty".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(GatewayError::Configuration {
                message: format!("processor base URL must be http(s): {}", self.base_url),
            });
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::Configuration {
                message: "processor timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// `Basic base64(application_id:secret)`
pub fn basic_auth_header(application_id: &str, api_secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", application_id, api_secret))
    )
}

pub struct ProcessorClient {
    config: ProcessorConfig,
    client: Client,
    authorization: String,
}

impl ProcessorClient {
    pub fn new(config: ProcessorConfig) -> GatewayResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        let authorization = basic_auth_header(&config.application_id, &config.api_secret);

        Ok(Self {
            config,
            client,
            authorization,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn transfer_body(request: &TransferRequest) -> JsonValue {
        let mut body = serde_json::json!({
            "merchant": request.merchant_external_id,
            "currency": request.currency,
            "amount": request.amount_cents,
            "source": request.source_token,
            "idempotency_id": request.idempotency_id,
        });
        if let Some(session) = &request.fraud_session_id {
            body["fraud_session_id"] = JsonValue::String(session.clone());
        }
        body
    }
}

#[async_trait]
impl TransferGateway for ProcessorClient {
    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<TransferResult> {
        info!(
            idempotency_id = %request.idempotency_id,
            amount_cents = request.amount_cents,
            currency = %request.currency,
            merchant = %request.merchant_external_id,
            source = %mask_token(&request.source_token),
            "creating processor transfer"
        );

        let response = self
            .client
            .post(self.endpoint(TRANSFERS_PATH))
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .header(API_VERSION_HEADER, &self.config.api_version)
            .json(&Self::transfer_body(&request))
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(GatewayError::from_reqwest)?;

        if status.is_success() {
            let body: JsonValue =
                serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse {
                    message: format!("invalid processor JSON response: {}", e),
                    status: status.as_u16(),
                    body: serde_json::json!({
                        "status": status.as_u16(),
                        "body": text,
                    }),
                })?;
            return parse_transfer(status, body);
        }

        warn!(
            idempotency_id = %request.idempotency_id,
            status = %status,
            "processor rejected transfer"
        );
        Ok(rejected_transfer(status, &text))
    }
}

fn string_field(value: &JsonValue, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 2xx body: `{id, state, failure_code?, failure_message?, ...}`
pub fn parse_transfer(status: StatusCode, body: JsonValue) -> GatewayResult<TransferResult> {
    let state = body
        .get("state")
        .and_then(JsonValue::as_str)
        .map(TransferState::from_processor);
    let Some(state) = state else {
        return Err(GatewayError::InvalidResponse {
            message: "processor response has no transfer state".to_string(),
            status: status.as_u16(),
            body,
        });
    };

    Ok(TransferResult {
        external_transfer_id: string_field(&body, "id"),
        state,
        failure_code: string_field(&body, "failure_code"),
        failure_message: string_field(&body, "failure_message"),
        raw_response: body,
    })
}

/// Non-2xx body: the first entry of `_embedded.errors`, falling back to the
/// HTTP status when the processor sends no usable envelope.
pub fn rejected_transfer(status: StatusCode, text: &str) -> TransferResult {
    let raw_response = serde_json::from_str::<JsonValue>(text).unwrap_or_else(|_| {
        serde_json::json!({
            "status": status.as_u16(),
            "body": text,
        })
    });

    let first_error = raw_response
        .pointer("/_embedded/errors/0")
        .cloned()
        .unwrap_or(JsonValue::Null);

    let failure_code =
        string_field(&first_error, "code").unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
    let failure_message = string_field(&first_error, "message").unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("processor returned HTTP {}", status.as_u16()))
    });

    TransferResult {
        external_transfer_id: None,
        state: TransferState::Failed,
        failure_code: Some(failure_code),
        failure_message: Some(failure_message),
        raw_response,
    }
}

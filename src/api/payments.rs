//! Payment endpoints
//!
//! POST /api/payments/fees           - fee quote for display
//! POST /api/payments                - submit a payment
//! GET  /api/payments/{idempotency}  - status of the caller's payment

use crate::api::AppState;
use crate::error::AppError;
use crate::middleware::error::{get_request_id_from_headers, json_rejection_response};
use crate::services::auth::bearer_token;
use crate::services::fee_calculation::PricingMethod;
use crate::services::payment_orchestrator::SubmitPaymentRequest;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FeeQuoteRequest {
    pub merchant_id: Uuid,
    pub base_amount_cents: i64,
    pub payment_method: PricingMethod,
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

fn error_response(err: impl Into<AppError>, headers: &HeaderMap) -> Response {
    let mut app_error: AppError = err.into();
    if let Some(request_id) = get_request_id_from_headers(headers) {
        app_error = app_error.with_request_id(request_id);
    }
    app_error.into_response()
}

pub async fn calculate_fee(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FeeQuoteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection_response(rejection, &headers),
    };

    match state
        .orchestrator
        .quote_fee(
            request.merchant_id,
            request.base_amount_cents,
            request.payment_method,
        )
        .await
    {
        Ok(breakdown) => Json(breakdown).into_response(),
        Err(e) => error_response(e, &headers),
    }
}

pub async fn submit_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubmitPaymentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection_response(rejection, &headers),
    };

    info!(
        idempotency_id = %request.idempotency_id,
        merchant_id = %request.merchant_id,
        submission_kind = request.submission_kind.as_str(),
        "Payment submission received"
    );

    match state
        .orchestrator
        .submit(request, authorization(&headers))
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e, &headers),
    }
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(idempotency_id): Path<String>,
) -> Response {
    match state
        .orchestrator
        .payment_status(&idempotency_id, authorization(&headers))
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e, &headers),
    }
}

//! ProcessorClient against a local fake processor

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use civicpay_backend::payments::error::GatewayError;
use civicpay_backend::payments::gateway::TransferGateway;
use civicpay_backend::payments::processor::{ProcessorClient, ProcessorConfig};
use civicpay_backend::payments::types::{TransferRequest, TransferState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const APPLICATION_ID: &str = "APgPDQrLD52TYvqazjHJJchM";
const API_SECRET: &str = "secret";

#[derive(Clone, Default)]
struct Seen {
    request: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

async fn spawn_processor(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, timeout: Duration) -> ProcessorClient {
    ProcessorClient::new(ProcessorConfig {
        base_url: base_url.to_string(),
        application_id: APPLICATION_ID.to_string(),
        api_secret: API_SECRET.to_string(),
        timeout,
        ..ProcessorConfig::default()
    })
    .unwrap()
}

fn transfer(fraud_session_id: Option<&str>) -> TransferRequest {
    TransferRequest {
        merchant_external_id: "MU_city".to_string(),
        currency: "USD".to_string(),
        amount_cents: 10_308,
        source_token: "PI_card_abc123".to_string(),
        idempotency_id: "tax-1-1700000000000-abcdefghi".to_string(),
        fraud_session_id: fraud_session_id.map(str::to_string),
    }
}

#[tokio::test]
async fn test_success_sends_authenticated_transfer() {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/transfers",
            post(
                |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    *seen.request.lock().await = Some((headers, body));
                    (
                        StatusCode::CREATED,
                        Json(json!({ "id": "TR_live_1", "state": "SUCCEEDED", "amount": 10308 })),
                    )
                },
            ),
        )
        .with_state(seen.clone());
    let base_url = spawn_processor(app).await;

    let result = client(&base_url, Duration::from_secs(5))
        .create_transfer(transfer(Some("fs_9")))
        .await
        .unwrap();

    assert_eq!(result.state, TransferState::Succeeded);
    assert!(result.is_success());
    assert_eq!(result.external_transfer_id.as_deref(), Some("TR_live_1"));
    assert_eq!(result.raw_response["amount"], 10308);

    let (headers, body) = seen.request.lock().await.clone().unwrap();
    assert_eq!(
        headers.get("authorization").unwrap(),
        "Basic QVBnUERRckxENTJUWXZxYXpqSEpKY2hNOnNlY3JldA=="
    );
    assert_eq!(headers.get("finix-version").unwrap(), "2022-02-01");
    assert!(headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    assert_eq!(body["merchant"], "MU_city");
    assert_eq!(body["currency"], "USD");
    assert_eq!(body["amount"], 10_308);
    assert_eq!(body["source"], "PI_card_abc123");
    assert_eq!(body["idempotency_id"], "tax-1-1700000000000-abcdefghi");
    assert_eq!(body["fraud_session_id"], "fs_9");
}

#[tokio::test]
async fn test_fraud_session_is_omitted_when_absent() {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/transfers",
            post(
                |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    *seen.request.lock().await = Some((headers, body));
                    Json(json!({ "id": "TR_2", "state": "PENDING" }))
                },
            ),
        )
        .with_state(seen.clone());
    let base_url = spawn_processor(app).await;

    let result = client(&base_url, Duration::from_secs(5))
        .create_transfer(transfer(None))
        .await
        .unwrap();
    assert_eq!(result.state, TransferState::Pending);

    let (_, body) = seen.request.lock().await.clone().unwrap();
    assert!(body.get("fraud_session_id").is_none());
}

#[tokio::test]
async fn test_error_envelope_maps_to_failed_transfer() {
    let app = Router::new().route(
        "/transfers",
        post(|| async {
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "total": 1,
                    "_embedded": {
                        "errors": [
                            { "code": "CARD_DECLINED", "message": "The card was declined" }
                        ]
                    }
                })),
            )
        }),
    );
    let base_url = spawn_processor(app).await;

    let result = client(&base_url, Duration::from_secs(5))
        .create_transfer(transfer(None))
        .await
        .unwrap();

    assert_eq!(result.state, TransferState::Failed);
    assert!(result.external_transfer_id.is_none());
    assert_eq!(result.failure_code.as_deref(), Some("CARD_DECLINED"));
    assert_eq!(
        result.failure_message.as_deref(),
        Some("The card was declined")
    );
    assert_eq!(result.raw_response["total"], 1);
}

#[tokio::test]
async fn test_non_json_error_falls_back_to_status() {
    let app = Router::new().route(
        "/transfers",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
    );
    let base_url = spawn_processor(app).await;

    let result = client(&base_url, Duration::from_secs(5))
        .create_transfer(transfer(None))
        .await
        .unwrap();

    assert_eq!(result.state, TransferState::Failed);
    assert_eq!(result.failure_code.as_deref(), Some("HTTP_500"));
    assert_eq!(
        result.failure_message.as_deref(),
        Some("Internal Server Error")
    );
    assert_eq!(result.raw_response["body"], "upstream exploded");
}

#[tokio::test]
async fn test_success_without_state_keeps_reply() {
    let app = Router::new().route(
        "/transfers",
        post(|| async {
            (
                StatusCode::CREATED,
                Json(json!({ "id": "TR_real_charge", "status": "SUCCEEDED" })),
            )
        }),
    );
    let base_url = spawn_processor(app).await;

    let err = client(&base_url, Duration::from_secs(5))
        .create_transfer(transfer(None))
        .await
        .unwrap_err();

    assert_eq!(err.failure_code(), Some("INVALID_RESPONSE"));
    assert!(err.outcome_unknown());
    match err {
        GatewayError::InvalidResponse { status, body, .. } => {
            assert_eq!(status, 201);
            assert_eq!(body["id"], "TR_real_charge");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_success_with_unparseable_body_keeps_text() {
    let app = Router::new().route("/transfers", post(|| async { "accepted" }));
    let base_url = spawn_processor(app).await;

    let err = client(&base_url, Duration::from_secs(5))
        .create_transfer(transfer(None))
        .await
        .unwrap_err();

    let raw = err.raw_response().cloned().unwrap();
    assert_eq!(raw["status"], 200);
    assert_eq!(raw["body"], "accepted");
}

#[tokio::test]
async fn test_slow_processor_times_out() {
    let app = Router::new().route(
        "/transfers",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "id": "TR_late", "state": "SUCCEEDED" }))
        }),
    );
    let base_url = spawn_processor(app).await;

    let err = client(&base_url, Duration::from_millis(200))
        .create_transfer(transfer(None))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Timeout { .. }));
    assert_eq!(err.failure_code(), Some("TIMEOUT"));
}

#[tokio::test]
async fn test_unreachable_processor_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}", addr), Duration::from_secs(5))
        .create_transfer(transfer(None))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Network { .. }));
    assert_eq!(err.failure_code(), None);
}

#[test]
fn test_missing_credentials_are_rejected() {
    let err = ProcessorClient::new(ProcessorConfig::default()).err().unwrap();
    assert!(matches!(err, GatewayError::Configuration { .. }));
}

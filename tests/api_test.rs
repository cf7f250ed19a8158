//! HTTP routes with in-memory storage

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use civicpay_backend::api::{router, AppState};
use civicpay_backend::database::instrument_repository::{InstrumentType, PaymentInstrument};
use civicpay_backend::database::memory::InMemoryStore;
use civicpay_backend::database::merchant_repository::MerchantAccount;
use civicpay_backend::database::repository::PaymentStores;
use civicpay_backend::health::HealthChecker;
use civicpay_backend::payments::gateway::MockTransferGateway;
use civicpay_backend::payments::types::{TransferResult, TransferState};
use civicpay_backend::services::auth::{AuthError, CallerIdentity, MockAuthContext};
use civicpay_backend::services::fee_calculation::FeeSchedule;
use civicpay_backend::services::PaymentOrchestrator;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    instrument_id: Uuid,
    merchant_id: Uuid,
}

async fn setup(gateway: MockTransferGateway) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let payer = Uuid::new_v4();

    let instrument = PaymentInstrument::new(payer, InstrumentType::PaymentCard, "PI_card");
    store.insert_instrument(&instrument).await.unwrap();
    let merchant = MerchantAccount::new(
        "City Treasury",
        Some("MU_city"),
        Some(FeeSchedule::card(250, 50)),
    );
    store.insert_merchant(&merchant).await.unwrap();

    let mut auth = MockAuthContext::new();
    auth.expect_caller_identity().returning(move |token| {
        if token == "good-token" {
            Ok(CallerIdentity {
                user_id: payer,
                email: None,
            })
        } else {
            Err(AuthError::InvalidToken {
                reason: "bad signature".to_string(),
            })
        }
    });

    let orchestrator = PaymentOrchestrator::new(
        PaymentStores::in_memory(store),
        Arc::new(gateway),
        Arc::new(auth),
    );

    TestApp {
        app: router(AppState {
            orchestrator: Arc::new(orchestrator),
            health_checker: HealthChecker::new(None),
        }),
        instrument_id: instrument.id,
        merchant_id: merchant.id,
    }
}

fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn submission_body(app: &TestApp, key: &str) -> Value {
    json!({
        "idempotencyId": key,
        "instrumentId": app.instrument_id,
        "merchantId": app.merchant_id,
        "baseAmountCents": 10000,
        "totalAmountCents": 10308,
        "submissionKind": "PERMIT_APPLICATION",
        "domainEntityId": "permit-31",
        "details": { "permitType": "building" }
    })
}

#[tokio::test]
async fn test_fee_quote_uses_merchant_schedule() {
    let app = setup(MockTransferGateway::new()).await;
    let body = json!({
        "merchantId": app.merchant_id,
        "baseAmountCents": 10000,
        "paymentMethod": "CARD"
    });

    let response = app
        .app
        .clone()
        .oneshot(post_json("/api/payments/fees", body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["totalAmountToChargeCents"], 10308);
    assert_eq!(json["serviceFeeDisplayCents"], 308);
    assert_eq!(json["isCard"], true);
}

#[tokio::test]
async fn test_fee_quote_accepts_method_aliases() {
    let app = setup(MockTransferGateway::new()).await;

    for (method, total, is_card) in [("PAYMENT_CARD", 10_308, true), ("ach", 10_070, false)] {
        let body = json!({
            "merchantId": app.merchant_id,
            "baseAmountCents": 10000,
            "paymentMethod": method
        });
        let response = app
            .app
            .clone()
            .oneshot(post_json("/api/payments/fees", body, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "method {}", method);
        let json = json_body(response).await;
        assert_eq!(json["totalAmountToChargeCents"], total);
        assert_eq!(json["isCard"], is_card);
    }
}

#[tokio::test]
async fn test_fee_quote_for_unpriceable_amount_is_bad_request() {
    let app = setup(MockTransferGateway::new()).await;
    let body = json!({
        "merchantId": app.merchant_id,
        "baseAmountCents": i64::MAX,
        "paymentMethod": "CARD"
    });

    let response = app
        .app
        .clone()
        .oneshot(post_json("/api/payments/fees", body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "INVALID_AMOUNT");
}

#[tokio::test]
async fn test_fee_quote_rejects_unknown_method() {
    let app = setup(MockTransferGateway::new()).await;
    let body = json!({
        "merchantId": app.merchant_id,
        "baseAmountCents": 10000,
        "paymentMethod": "CRYPTO"
    });

    let response = app
        .app
        .clone()
        .oneshot(post_json("/api/payments/fees", body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert!(json["details"]["reason"]
        .as_str()
        .unwrap()
        .contains("unsupported payment method"));
}

#[tokio::test]
async fn test_fee_quote_for_unknown_merchant_is_unprocessable() {
    let app = setup(MockTransferGateway::new()).await;
    let body = json!({
        "merchantId": Uuid::new_v4(),
        "baseAmountCents": 10000,
        "paymentMethod": "BANK"
    });

    let response = app
        .app
        .clone()
        .oneshot(post_json("/api/payments/fees", body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["error"], "MERCHANT_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_unknown_fields_are_rejected() {
    let mut gateway = MockTransferGateway::new();
    gateway.expect_create_transfer().never();
    let app = setup(gateway).await;

    let mut body = submission_body(&app, "permit-31-1700000000000-unknownf1");
    body["serviceFeeCents"] = json!(1);

    let response = app
        .app
        .clone()
        .oneshot(post_json("/api/payments", body, Some("good-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert!(json["details"]["reason"]
        .as_str()
        .unwrap()
        .contains("serviceFeeCents"));
}

#[tokio::test]
async fn test_submission_requires_bearer_token() {
    let mut gateway = MockTransferGateway::new();
    gateway.expect_create_transfer().never();
    let app = setup(gateway).await;
    let body = submission_body(&app, "permit-31-1700000000000-noauth001");

    let response = app
        .app
        .clone()
        .oneshot(post_json("/api/payments", body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_submission_and_status_round_trip() {
    let mut gateway = MockTransferGateway::new();
    gateway.expect_create_transfer().times(1).returning(|_| {
        Ok(TransferResult {
            external_transfer_id: Some("TR_api".to_string()),
            state: TransferState::Succeeded,
            failure_code: None,
            failure_message: None,
            raw_response: json!({ "id": "TR_api", "state": "SUCCEEDED" }),
        })
    });
    let app = setup(gateway).await;
    let key = "permit-31-1700000000000-apiroute1";

    let response = app
        .app
        .clone()
        .oneshot(post_json(
            "/api/payments",
            submission_body(&app, key),
            Some("good-token"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["transferState"], "SUCCEEDED");
    assert_eq!(json["deduplicated"], false);

    let status = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/payments/{}", key))
                .header("authorization", "Bearer good-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let json = json_body(status).await;
    assert_eq!(json["payment"]["idempotencyId"], key);
    assert_eq!(json["payment"]["externalTransferId"], "TR_api");
    assert!(json["payment"].get("rawResponse").is_none());
    assert_eq!(json["submission"]["paymentStatus"], "paid");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = setup(MockTransferGateway::new()).await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-abc");
}

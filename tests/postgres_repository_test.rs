//! Postgres repositories against a live database
//!
//! Run with `DATABASE_URL` pointing at a scratch database and `--ignored`.

use civicpay_backend::database::domain_submission_repository::{
    DomainSubmission, DomainSubmissionRepository, PaymentStatus, SubmissionKind, SubmissionStatus,
};
use civicpay_backend::database::error::DatabaseErrorKind;
use civicpay_backend::database::instrument_repository::{InstrumentRepository, InstrumentType};
use civicpay_backend::database::merchant_repository::MerchantRepository;
use civicpay_backend::database::payment_history_repository::{
    OutcomeUpdate, PaymentHistoryRecord, PaymentHistoryRepository,
};
use civicpay_backend::database::repository::{
    DomainSubmissionStore, InstrumentStore, MerchantStore, PaymentHistoryStore,
};
use civicpay_backend::database::run_migrations;
use civicpay_backend::payments::types::TransferState;
use sqlx::PgPool;
use uuid::Uuid;

async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/civicpay_test".to_string());

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

async fn seed_instrument(pool: &PgPool, user_id: Uuid, enabled: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO payment_instruments (id, user_id, instrument_type, external_token, enabled)
         VALUES ($1, $2, 'PAYMENT_CARD', 'PI_pg_card', $3)",
    )
    .bind(id)
    .bind(user_id)
    .bind(enabled)
    .execute(pool)
    .await
    .expect("insert instrument");
    id
}

async fn seed_merchant(pool: &PgPool, external_id: Option<&str>, with_schedule: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO merchants (id, name, external_merchant_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind("County Clerk")
        .bind(external_id)
        .execute(pool)
        .await
        .expect("insert merchant");

    if with_schedule {
        sqlx::query(
            "INSERT INTO merchant_fee_schedules (merchant_id, card_basis_points, card_fixed_fee_cents)
             VALUES ($1, 290, 30)",
        )
        .bind(id)
        .execute(pool)
        .await
        .expect("insert fee schedule");
    }
    id
}

struct Seeded {
    user_id: Uuid,
    instrument_id: Uuid,
    merchant_id: Uuid,
    submission: DomainSubmission,
}

async fn seed_submission(pool: &PgPool) -> Seeded {
    let user_id = Uuid::new_v4();
    let instrument_id = seed_instrument(pool, user_id, true).await;
    let merchant_id = seed_merchant(pool, Some("MU_pg"), true).await;

    let submission = DomainSubmission::awaiting_payment(
        SubmissionKind::BusinessLicense,
        "license-88",
        user_id,
        merchant_id,
        serde_json::json!({ "licenseClass": "B" }),
    );
    let submission = DomainSubmissionRepository::new(pool.clone())
        .insert(&submission)
        .await
        .expect("insert submission");

    Seeded {
        user_id,
        instrument_id,
        merchant_id,
        submission,
    }
}

fn pending_for(seeded: &Seeded, idempotency_id: &str) -> PaymentHistoryRecord {
    PaymentHistoryRecord::pending(
        idempotency_id,
        seeded.user_id,
        seeded.instrument_id,
        seeded.merchant_id,
        seeded.submission.id,
        10_000,
        10_308,
        "USD",
        "fingerprint",
    )
}

fn unique_key() -> String {
    format!("license-88-1700000000000-{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore] // Requires database
async fn test_instrument_lookup_maps_row() {
    let pool = setup_test_db().await;
    let user_id = Uuid::new_v4();
    let id = seed_instrument(&pool, user_id, false).await;
    let repo = InstrumentRepository::new(pool);

    let instrument = repo.find_instrument(id).await.unwrap().unwrap();
    assert_eq!(instrument.user_id, user_id);
    assert_eq!(instrument.instrument_type, InstrumentType::PaymentCard);
    assert_eq!(instrument.external_token, "PI_pg_card");
    assert!(!instrument.enabled);
    assert!(!instrument.is_usable_by(&user_id));

    assert!(repo.find_instrument(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_merchant_lookup_joins_fee_schedule() {
    let pool = setup_test_db().await;
    let with_schedule = seed_merchant(&pool, Some("MU_pg"), true).await;
    let without_schedule = seed_merchant(&pool, None, false).await;
    let repo = MerchantRepository::new(pool);

    let merchant = repo.find_merchant(with_schedule).await.unwrap().unwrap();
    assert_eq!(merchant.processor_identity(), Some("MU_pg"));
    assert_eq!(merchant.currency, "USD");
    let schedule = merchant.fee_schedule.unwrap();
    assert_eq!(schedule.basis_points, Some(290));
    assert_eq!(schedule.fixed_fee_cents, Some(30));
    assert_eq!(schedule.ach_basis_points, None);
    assert_eq!(schedule.ach_fixed_fee_cents, None);

    let merchant = repo.find_merchant(without_schedule).await.unwrap().unwrap();
    assert!(merchant.fee_schedule.is_none());
    assert_eq!(merchant.processor_identity(), None);

    assert!(repo.find_merchant(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_duplicate_idempotency_id_is_unique_violation() {
    let pool = setup_test_db().await;
    let seeded = seed_submission(&pool).await;
    let repo = PaymentHistoryRepository::new(pool);
    let key = unique_key();

    let first = repo.insert(&pending_for(&seeded, &key)).await.unwrap();
    assert_eq!(first.transfer_state, TransferState::Pending);
    assert_eq!(first.service_fee_cents, 308);

    let err = repo.insert(&pending_for(&seeded, &key)).await.unwrap_err();
    assert!(err.is_unique_violation());
    assert!(matches!(
        err.kind,
        DatabaseErrorKind::UniqueViolation { ref constraint }
            if constraint == "payment_history_idempotency_id_key"
    ));

    let found = repo.find_by_idempotency_id(&key).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_outcome_applies_only_to_pending_rows() {
    let pool = setup_test_db().await;
    let seeded = seed_submission(&pool).await;
    let repo = PaymentHistoryRepository::new(pool);
    let record = repo
        .insert(&pending_for(&seeded, &unique_key()))
        .await
        .unwrap();

    let outcome = OutcomeUpdate {
        transfer_state: TransferState::Succeeded,
        external_transfer_id: Some("TR_pg".to_string()),
        failure_code: None,
        failure_message: None,
        raw_response: Some(serde_json::json!({ "id": "TR_pg", "state": "SUCCEEDED" })),
    };
    let updated = repo.record_outcome(record.id, &outcome).await.unwrap();
    assert_eq!(updated.transfer_state, TransferState::Succeeded);
    assert_eq!(updated.external_transfer_id.as_deref(), Some("TR_pg"));
    assert_eq!(updated.raw_response.unwrap()["state"], "SUCCEEDED");

    let again = OutcomeUpdate {
        transfer_state: TransferState::Failed,
        ..outcome.clone()
    };
    let err = repo.record_outcome(record.id, &again).await.unwrap_err();
    assert!(matches!(err.kind, DatabaseErrorKind::StaleState { .. }));

    let unchanged = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(unchanged.transfer_state, TransferState::Succeeded);

    let err = repo
        .record_outcome(Uuid::new_v4(), &outcome)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_submission_link_status_and_delete() {
    let pool = setup_test_db().await;
    let seeded = seed_submission(&pool).await;
    let ledger = PaymentHistoryRepository::new(pool.clone());
    let repo = DomainSubmissionRepository::new(pool);
    let record = ledger
        .insert(&pending_for(&seeded, &unique_key()))
        .await
        .unwrap();

    repo.link_payment(seeded.submission.id, record.id)
        .await
        .unwrap();
    let paid_at = chrono::Utc::now();
    let updated = repo
        .update_status(
            seeded.submission.id,
            PaymentStatus::Paid,
            SubmissionStatus::Submitted,
            Some(paid_at),
        )
        .await
        .unwrap();
    assert_eq!(updated.payment_history_id, Some(record.id));
    assert_eq!(updated.payment_status, PaymentStatus::Paid);
    assert_eq!(updated.submission_status, SubmissionStatus::Submitted);
    assert!(updated.paid_at.is_some());
    assert_eq!(updated.details["licenseClass"], "B");

    let err = repo
        .link_payment(Uuid::new_v4(), record.id)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));

    let orphan = DomainSubmission::awaiting_payment(
        SubmissionKind::PermitApplication,
        "permit-9",
        seeded.user_id,
        seeded.merchant_id,
        serde_json::json!({}),
    );
    let orphan = repo.insert(&orphan).await.unwrap();
    assert!(repo.delete(orphan.id).await.unwrap());
    assert!(!repo.delete(orphan.id).await.unwrap());
    assert!(repo.find_by_id(orphan.id).await.unwrap().is_none());
}

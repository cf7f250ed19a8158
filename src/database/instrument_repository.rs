use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::InstrumentStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentType {
    PaymentCard,
    BankAccount,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::PaymentCard => "PAYMENT_CARD",
            InstrumentType::BankAccount => "BANK_ACCOUNT",
        }
    }
}

impl FromStr for InstrumentType {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PAYMENT_CARD" => Ok(InstrumentType::PaymentCard),
            "BANK_ACCOUNT" => Ok(InstrumentType::BankAccount),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown instrument type: {}", other),
            })),
        }
    }
}

/// Tokenized card or bank account owned by a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInstrument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub instrument_type: InstrumentType,
    /// Processor-side reference used as the transfer source
    pub external_token: String,
    pub enabled: bool,
    pub is_default: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentInstrument {
    pub fn new(user_id: Uuid, instrument_type: InstrumentType, external_token: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            instrument_type,
            external_token: external_token.to_string(),
            enabled: true,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_usable_by(&self, user_id: &Uuid) -> bool {
        self.enabled && &self.user_id == user_id
    }
}

#[derive(Debug, FromRow)]
struct InstrumentRow {
    id: Uuid,
    user_id: Uuid,
    instrument_type: String,
    external_token: String,
    enabled: bool,
    is_default: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl InstrumentRow {
    fn into_entity(self) -> Result<PaymentInstrument, DatabaseError> {
        Ok(PaymentInstrument {
            id: self.id,
            user_id: self.user_id,
            instrument_type: self.instrument_type.parse()?,
            external_token: self.external_token,
            enabled: self.enabled,
            is_default: self.is_default,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed payment instrument lookups
pub struct InstrumentRepository {
    pool: PgPool,
}

impl InstrumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstrumentStore for InstrumentRepository {
    async fn find_instrument(&self, id: Uuid) -> Result<Option<PaymentInstrument>, DatabaseError> {
        let row = sqlx::query_as::<_, InstrumentRow>(
            "SELECT id, user_id, instrument_type, external_token, enabled, is_default,
                    created_at, updated_at
             FROM payment_instruments
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(InstrumentRow::into_entity).transpose()
    }
}

use crate::database::error::DatabaseError;
use crate::database::repository::MerchantStore;
use crate::services::fee_calculation::FeeSchedule;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Merchant configuration as seen by the payment core (read-only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantAccount {
    pub id: Uuid,
    pub name: String,
    /// Merchant identity at the payment processor; transfers cannot be created without it
    pub external_merchant_id: Option<String>,
    pub currency: String,
    pub fee_schedule: Option<FeeSchedule>,
}

impl MerchantAccount {
    pub fn new(name: &str, external_merchant_id: Option<&str>, fee_schedule: Option<FeeSchedule>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            external_merchant_id: external_merchant_id.map(str::to_string),
            currency: DEFAULT_CURRENCY.to_string(),
            fee_schedule,
        }
    }

    pub fn processor_identity(&self) -> Option<&str> {
        self.external_merchant_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, FromRow)]
struct MerchantRow {
    id: Uuid,
    name: String,
    external_merchant_id: Option<String>,
    currency: String,
    has_fee_schedule: bool,
    card_basis_points: Option<i32>,
    card_fixed_fee_cents: Option<i64>,
    ach_basis_points: Option<i32>,
    ach_fixed_fee_cents: Option<i64>,
}

impl MerchantRow {
    fn into_entity(self) -> MerchantAccount {
        // A negative stored rate is carried through as u32::MAX so the fee
        // calculator rejects it instead of silently clamping.
        let bp = |v: Option<i32>| v.map(|v| u32::try_from(v).unwrap_or(u32::MAX));
        let fee_schedule = self.has_fee_schedule.then(|| FeeSchedule {
            basis_points: bp(self.card_basis_points),
            fixed_fee_cents: self.card_fixed_fee_cents,
            ach_basis_points: bp(self.ach_basis_points),
            ach_fixed_fee_cents: self.ach_fixed_fee_cents,
        });

        MerchantAccount {
            id: self.id,
            name: self.name,
            external_merchant_id: self.external_merchant_id,
            currency: self.currency,
            fee_schedule,
        }
    }
}

pub struct MerchantRepository {
    pool: PgPool,
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MERCHANT_COLUMNS: &str = "m.id, m.name, m.external_merchant_id, m.currency,
    (f.merchant_id IS NOT NULL) AS has_fee_schedule,
    f.card_basis_points, f.card_fixed_fee_cents, f.ach_basis_points, f.ach_fixed_fee_cents";

#[async_trait]
impl MerchantStore for MerchantRepository {
    async fn find_merchant(&self, id: Uuid) -> Result<Option<MerchantAccount>, DatabaseError> {
        let query = format!(
            "SELECT {MERCHANT_COLUMNS}
             FROM merchants m
             LEFT JOIN merchant_fee_schedules f ON f.merchant_id = m.id
             WHERE m.id = $1"
        );

        let row = sqlx::query_as::<_, MerchantRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(MerchantRow::into_entity))
    }
}

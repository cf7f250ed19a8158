//! Grossed-up processor fee pricing
//!
//! The payer is charged `round((base + fixed) / (1 - bp / 10000))` so that once
//! the processor takes its percentage-plus-fixed cut the merchant nets the base
//! amount. Everything here is pure: no I/O, no clock, no randomness. The same
//! code backs the display-only fee endpoint and the authoritative server-side
//! recomputation done before a transfer is created.

use crate::database::instrument_repository::InstrumentType;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const BASIS_POINTS_DENOMINATOR: u32 = 10_000;
pub const DEFAULT_CARD_BASIS_POINTS: u32 = 250;
pub const DEFAULT_CARD_FIXED_FEE_CENTS: i64 = 50;
pub const DEFAULT_ACH_BASIS_POINTS: u32 = 20;
pub const DEFAULT_ACH_FIXED_FEE_CENTS: i64 = 50;

pub type FeeResult<T> = Result<T, FeeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    #[error("Invalid fee configuration: {reason}")]
    InvalidFeeConfiguration { reason: String },

    #[error("Amount out of range: {amount_cents} cents cannot be priced")]
    AmountOutOfRange { amount_cents: i64 },
}

/// Per-merchant fee configuration. Omitted fields fall back to the processor
/// defaults (card 2.50% + 50¢, ACH 0.20% + 50¢).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    #[serde(default)]
    pub basis_points: Option<u32>,
    #[serde(default)]
    pub fixed_fee_cents: Option<i64>,
    #[serde(default)]
    pub ach_basis_points: Option<u32>,
    #[serde(default)]
    pub ach_fixed_fee_cents: Option<i64>,
}

impl FeeSchedule {
    pub fn card(basis_points: u32, fixed_fee_cents: i64) -> Self {
        Self {
            basis_points: Some(basis_points),
            fixed_fee_cents: Some(fixed_fee_cents),
            ..Self::default()
        }
    }

    pub fn ach(basis_points: u32, fixed_fee_cents: i64) -> Self {
        Self {
            ach_basis_points: Some(basis_points),
            ach_fixed_fee_cents: Some(fixed_fee_cents),
            ..Self::default()
        }
    }

    /// `(basis_points, fixed_fee_cents)` for the given pricing method with defaults applied.
    pub fn rates_for(&self, method: PricingMethod) -> (u32, i64) {
        if method.is_card() {
            (
                self.basis_points.unwrap_or(DEFAULT_CARD_BASIS_POINTS),
                self.fixed_fee_cents.unwrap_or(DEFAULT_CARD_FIXED_FEE_CENTS),
            )
        } else {
            (
                self.ach_basis_points.unwrap_or(DEFAULT_ACH_BASIS_POINTS),
                self.ach_fixed_fee_cents.unwrap_or(DEFAULT_ACH_FIXED_FEE_CENTS),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported payment method: {0}")]
pub struct UnsupportedPricingMethod(pub String);

/// How the payer is paying. Wallet methods settle over card rails and are
/// always priced with the card pair. Parsing is case-insensitive and accepts
/// the instrument-type aliases (`PAYMENT_CARD`, `BANK_ACCOUNT`, `ACH`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum PricingMethod {
    Card,
    Bank,
    GooglePay,
    ApplePay,
}

impl PricingMethod {
    pub fn is_card(&self) -> bool {
        matches!(
            self,
            PricingMethod::Card | PricingMethod::GooglePay | PricingMethod::ApplePay
        )
    }

    pub fn from_instrument_type(instrument_type: InstrumentType) -> Self {
        match instrument_type {
            InstrumentType::PaymentCard => PricingMethod::Card,
            InstrumentType::BankAccount => PricingMethod::Bank,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingMethod::Card => "CARD",
            PricingMethod::Bank => "BANK",
            PricingMethod::GooglePay => "GOOGLE_PAY",
            PricingMethod::ApplePay => "APPLE_PAY",
        }
    }
}

impl std::fmt::Display for PricingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PricingMethod {
    type Err = UnsupportedPricingMethod;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "CARD" | "PAYMENT_CARD" => Ok(PricingMethod::Card),
            "BANK" | "BANK_ACCOUNT" | "ACH" => Ok(PricingMethod::Bank),
            "GOOGLE_PAY" => Ok(PricingMethod::GooglePay),
            "APPLE_PAY" => Ok(PricingMethod::ApplePay),
            _ => Err(UnsupportedPricingMethod(value.to_string())),
        }
    }
}

impl TryFrom<String> for PricingMethod {
    type Error = UnsupportedPricingMethod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub base_amount_cents: i64,
    /// Display only; the charge total is fully determined by the gross-up.
    pub percentage_fee_cents: i64,
    pub fixed_fee_cents: i64,
    pub basis_points: u32,
    pub is_card: bool,
    pub total_amount_to_charge_cents: i64,
    pub service_fee_display_cents: i64,
}

pub struct FeeCalculator;

impl FeeCalculator {
    pub fn calculate(
        base_amount_cents: i64,
        method: PricingMethod,
        schedule: &FeeSchedule,
    ) -> FeeResult<FeeBreakdown> {
        let (basis_points, fixed_fee_cents) = schedule.rates_for(method);

        if basis_points >= BASIS_POINTS_DENOMINATOR {
            return Err(FeeError::InvalidFeeConfiguration {
                reason: format!(
                    "basis points must be below {} (got {})",
                    BASIS_POINTS_DENOMINATOR, basis_points
                ),
            });
        }
        if fixed_fee_cents < 0 {
            return Err(FeeError::InvalidFeeConfiguration {
                reason: format!("fixed fee cannot be negative (got {})", fixed_fee_cents),
            });
        }

        let denominator = Decimal::from(BASIS_POINTS_DENOMINATOR);
        let percentage = Decimal::from(basis_points) / denominator;
        let gross = (Decimal::from(base_amount_cents) + Decimal::from(fixed_fee_cents))
            / (Decimal::ONE - percentage);

        let total_amount_to_charge_cents = round_cents(gross).ok_or(FeeError::AmountOutOfRange {
            amount_cents: base_amount_cents,
        })?;
        let percentage_fee_cents =
            round_cents(Decimal::from(base_amount_cents) * percentage).ok_or(
                FeeError::AmountOutOfRange {
                    amount_cents: base_amount_cents,
                },
            )?;

        Ok(FeeBreakdown {
            base_amount_cents,
            percentage_fee_cents,
            fixed_fee_cents,
            basis_points,
            is_card: method.is_card(),
            total_amount_to_charge_cents,
            service_fee_display_cents: total_amount_to_charge_cents - base_amount_cents,
        })
    }
}

fn round_cents(value: Decimal) -> Option<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

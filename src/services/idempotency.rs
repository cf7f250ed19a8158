//! Idempotency keys for payment attempts
//!
//! Keys are `{prefix}-{entity}-{unix_millis}-{suffix}`. The timestamp means a
//! fresh click produces a fresh key; only a caller that deliberately forwards
//! the same key (network retry) is short-circuited by the orchestrator.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

pub const KEY_DELIMITER: char = '-';
pub const SUFFIX_LEN: usize = 9;
pub const MAX_KEY_LEN: usize = 255;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyKeyError {
    #[error("idempotency key is empty")]
    Empty,
    #[error("idempotency key exceeds {MAX_KEY_LEN} bytes")]
    TooLong,
    #[error("idempotency key contains unsupported characters")]
    InvalidCharacters,
}

pub struct IdempotencyKeyGenerator;

impl IdempotencyKeyGenerator {
    pub fn generate(prefix: &str, domain_entity_id: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        Self::compose(prefix, domain_entity_id, millis, &random_suffix())
    }

    /// Characters outside the key charset in `prefix` or `domain_entity_id`
    /// are replaced with `_`, so a composed key always passes [`Self::validate`]
    /// as long as it fits in [`MAX_KEY_LEN`].
    pub fn compose(prefix: &str, domain_entity_id: &str, millis: i64, suffix: &str) -> String {
        format!(
            "{}{d}{}{d}{millis}{d}{suffix}",
            key_safe(prefix),
            key_safe(domain_entity_id),
            d = KEY_DELIMITER
        )
    }

    pub fn validate(key: &str) -> Result<(), IdempotencyKeyError> {
        if key.trim().is_empty() {
            return Err(IdempotencyKeyError::Empty);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(IdempotencyKeyError::TooLong);
        }
        if !key_pattern().is_match(key) {
            return Err(IdempotencyKeyError::InvalidCharacters);
        }
        Ok(())
    }
}

fn key_safe(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Nine lowercase base-36 characters drawn from a v4 UUID.
fn random_suffix() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(SUFFIX_LEN)
        .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
        .collect()
}

/// Hash of the fields that define "the same payment". A replayed key must
/// carry the same fingerprint or it is a different payment reusing a key.
pub fn request_fingerprint(
    user_id: &Uuid,
    instrument_id: &Uuid,
    merchant_id: &Uuid,
    base_amount_cents: i64,
    domain_entity_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(instrument_id.as_bytes());
    hasher.update(merchant_id.as_bytes());
    hasher.update(base_amount_cents.to_be_bytes());
    hasher.update(domain_entity_id.as_bytes());
    hex::encode(hasher.finalize())
}

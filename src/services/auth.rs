//! Caller authentication for the payment endpoints

use crate::config::AuthConfig;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("token subject is not a user id")]
    InvalidSubject,
}

/// Resolves a bearer token to the calling user
#[automock]
#[async_trait]
pub trait AuthContext: Send + Sync {
    async fn caller_identity(&self, bearer_token: &str) -> Result<CallerIdentity, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// HS256 JWT verification with the shared signing secret
pub struct JwtAuthContext {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthContext {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl AuthContext for JwtAuthContext {
    async fn caller_identity(&self, bearer_token: &str) -> Result<CallerIdentity, AuthError> {
        let token = bearer_token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            AuthError::InvalidToken {
                reason: e.to_string(),
            }
        })?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidSubject)?;

        Ok(CallerIdentity {
            user_id,
            email: data.claims.email,
        })
    }
}

/// Strip the `Bearer ` scheme from an Authorization header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "supersecretjwtsecretforunittesting123";

    fn token_for(sub: &str, exp: usize, secret: &str, aud: Option<&str>) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
            email: Some("payer@example.com".to_string()),
            aud: aud.map(str::to_string),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn context(audience: Option<&str>) -> JwtAuthContext {
        JwtAuthContext::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
            audience: audience.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn valid_token_resolves_user() {
        let user_id = Uuid::new_v4();
        let token = token_for(&user_id.to_string(), 9_999_999_999, SECRET, None);

        let identity = context(None).caller_identity(&token).await.unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.email.as_deref(), Some("payer@example.com"));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = token_for(&Uuid::new_v4().to_string(), 1, SECRET, None);
        let err = context(None).caller_identity(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected() {
        let token = token_for(&Uuid::new_v4().to_string(), 9_999_999_999, "wrongsecret", None);
        assert!(context(None).caller_identity(&token).await.is_err());
    }

    #[tokio::test]
    async fn audience_is_enforced_when_configured() {
        let sub = Uuid::new_v4().to_string();
        let ok = token_for(&sub, 9_999_999_999, SECRET, Some("civicpay"));
        let other = token_for(&sub, 9_999_999_999, SECRET, Some("elsewhere"));

        let ctx = context(Some("civicpay"));
        assert!(ctx.caller_identity(&ok).await.is_ok());
        assert!(ctx.caller_identity(&other).await.is_err());
    }

    #[tokio::test]
    async fn non_uuid_subject_is_rejected() {
        let token = token_for("user-42", 9_999_999_999, SECRET, None);
        assert_eq!(
            context(None).caller_identity(&token).await.unwrap_err(),
            AuthError::InvalidSubject
        );
    }

    #[test]
    fn bearer_scheme_is_stripped() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}

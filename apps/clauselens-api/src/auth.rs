//! Bearer authentication
//!
//! Credentials are owned by the external identity provider; this module
//! only verifies the bearer token it issued and injects the authenticated
//! user into handlers via the [`AuthUser`] extractor. Verification sits
//! behind [`TokenVerifier`] so tests can swap in a static fake.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Identity asserted by a verified token.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

pub trait TokenVerifier: Send + Sync {
    /// Returns the claims for a valid token, `None` otherwise.
    fn verify(&self, token: &str) -> Option<AuthClaims>;
}

/// HS256 JWT verification against the identity provider's shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[derive(Deserialize)]
struct JwtClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Option<AuthClaims> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).ok()?;
        Some(AuthClaims {
            sub: data.claims.sub,
            name: data.claims.name,
            email: data.claims.email,
        })
    }
}

/// Fixed token-to-claims table standing in for the identity provider.
#[cfg(test)]
pub struct StaticVerifier {
    tokens: std::collections::HashMap<String, AuthClaims>,
}

#[cfg(test)]
impl StaticVerifier {
    pub fn new(entries: &[(&str, &str, &str, &str)]) -> Self {
        let tokens = entries
            .iter()
            .map(|(token, sub, name, email)| {
                (
                    token.to_string(),
                    AuthClaims {
                        sub: sub.to_string(),
                        name: Some(name.to_string()),
                        email: Some(email.to_string()),
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

#[cfg(test)]
impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Option<AuthClaims> {
        self.tokens.get(token).cloned()
    }
}

/// Extractor: authenticated caller, 401 on a missing or invalid bearer.
pub struct AuthUser(pub AuthClaims);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Auth)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Auth)?;
        let claims = state.verifier.verify(token).ok_or(ApiError::Auth)?;
        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        name: String,
        email: String,
        exp: i64,
    }

    fn token(secret: &str, exp_offset_secs: i64) -> String {
        let claims = TestClaims {
            sub: "user-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            exp: chrono_now() + exp_offset_secs,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn chrono_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn valid_token_yields_claims() {
        let verifier = JwtVerifier::new("secret");
        let claims = verifier.verify(&token("secret", 3600)).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new("secret");
        assert!(verifier.verify(&token("other-secret", 3600)).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::new("secret");
        assert!(verifier.verify(&token("secret", -3600)).is_none());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let verifier = JwtVerifier::new("secret");
        assert!(verifier.verify("not-a-jwt").is_none());
    }
}

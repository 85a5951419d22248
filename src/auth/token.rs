//! Stateless access tokens.
//!
//! Tokens are HS256 JWTs binding a user id to a username. Nothing is stored
//! server-side, so a token stays valid until it expires even if the account
//! changes or disappears in the meantime.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Access denied. No token provided.")]
    Missing,

    #[error("Invalid token.")]
    Invalid,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Uses the configured secret, or a random one when none is set.
    pub fn from_config(auth: &AuthConfig) -> Self {
        let ttl = Duration::minutes(auth.token_ttl_minutes);
        match auth.token_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Self::new(secret.as_bytes(), ttl),
            _ => {
                tracing::warn!(
                    "No token secret configured; generated a random one. \
                     Issued tokens will not survive a restart."
                );
                Self::new(generate_secret().as_bytes(), ttl)
            }
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(user_id, username, Utc::now())
    }

    /// Mints a token as if the clock read `now`.
    pub fn issue_at(
        &self,
        user_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Missing)?;

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            AuthError::Invalid
        })?;

        Ok(Identity {
            user_id: data.claims.user_id,
            username: data.claims.username,
        })
    }
}

/// 32 random bytes, hex encoded.
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new(b"test-secret", Duration::hours(1))
    }

    #[test]
    fn issued_token_verifies() {
        let keys = keys();
        let token = keys.issue("user-1", "alice").unwrap();
        let identity = keys.verify(Some(&token)).unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: "user-1".into(),
                username: "alice".into(),
            }
        );
    }

    #[test]
    fn token_within_window_verifies() {
        let keys = keys();
        let issued = Utc::now() - Duration::minutes(59);
        let token = keys.issue_at("user-1", "alice", issued).unwrap();
        assert!(keys.verify(Some(&token)).is_ok());
    }

    #[test]
    fn expired_token_is_invalid() {
        let keys = keys();
        let issued = Utc::now() - Duration::minutes(61);
        let token = keys.issue_at("user-1", "alice", issued).unwrap();
        assert_eq!(keys.verify(Some(&token)), Err(AuthError::Invalid));
    }

    #[test]
    fn missing_token_is_distinguished() {
        let keys = keys();
        assert_eq!(keys.verify(None), Err(AuthError::Missing));
        assert_eq!(keys.verify(Some("  ")), Err(AuthError::Missing));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let other = TokenKeys::new(b"another-secret", Duration::hours(1));
        let token = other.issue("user-1", "alice").unwrap();
        assert_eq!(keys().verify(Some(&token)), Err(AuthError::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(keys().verify(Some("not-a-jwt")), Err(AuthError::Invalid));
    }

    #[test]
    fn claims_use_user_id_field_name() {
        let claims = Claims {
            user_id: "u".into(),
            username: "alice".into(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(claims).unwrap();
        assert_eq!(json["userId"], "u");
    }

    #[test]
    fn random_secret_is_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn unconfigured_secret_still_round_trips() {
        let keys = TokenKeys::from_config(&AuthConfig::default());
        assert_eq!(keys.ttl(), Duration::minutes(60));
        let token = keys.issue("u", "bob").unwrap();
        assert_eq!(keys.verify(Some(&token)).unwrap().username, "bob");
    }
}

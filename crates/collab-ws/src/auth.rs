//! Bearer token validation for socket connects.
//!
//! Tokens are issued by the external auth service; this side only checks
//! the signature, the expiry and that the token is an access token.

use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("token expired")]
    Expired,

    #[error("not an access token")]
    WrongTokenType,

    #[error("invalid token")]
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user id).
    pub sub: Uuid,
    #[serde(rename = "type")]
    pub token_type: String,
    pub exp: u64,
}

pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Validate a bearer token and return its claims. Expired tokens and
    /// non-access tokens are distinct failures so the connect handler can
    /// report them precisely.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;

        if data.claims.token_type != "access" {
            return Err(AuthError::WrongTokenType);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "test-secret";

    fn token(token_type: &str, exp_offset: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = Claims {
            sub: Uuid::new_v4(),
            token_type: token_type.to_string(),
            exp: (now + exp_offset) as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_access_token() {
        let validator = TokenValidator::new(SECRET);
        let claims = validator.validate(&token("access", 3600)).unwrap();
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn rejects_refresh_tokens() {
        let validator = TokenValidator::new(SECRET);
        assert_eq!(
            validator.validate(&token("refresh", 3600)),
            Err(AuthError::WrongTokenType)
        );
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let validator = TokenValidator::new(SECRET);
        assert_eq!(
            validator.validate(&token("access", -3600)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let validator = TokenValidator::new("other-secret");
        assert_eq!(
            validator.validate(&token("access", 3600)),
            Err(AuthError::Invalid)
        );
    }
}

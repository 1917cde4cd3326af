use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Claims carried by a bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user the token was minted for.
    pub user_uuid: Uuid,
    /// Expiry as a Unix timestamp.
    pub exp: i64,
}

/// Mints and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    /// Creates an issuer signing with `secret`; tokens live for `ttl_days`.
    pub fn new(secret: &[u8], ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Mints a token for `user_uuid` that expires `ttl` from now.
    pub fn issue(&self, user_uuid: Uuid) -> Result<String> {
        let claims = Claims {
            user_uuid,
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Parses and checks signature and expiry, returning the user identifier.
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            AppError::Unauthenticated("Invalid or expired token".to_string())
        })?;

        Ok(data.claims.user_uuid)
    }

    #[cfg(test)]
    pub(crate) fn issue_with_expiry(&self, user_uuid: Uuid, exp: i64) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &Claims { user_uuid, exp },
            &self.encoding,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let issuer = TokenIssuer::new(b"secret", 30);
        let user = Uuid::new_v4();
        let token = issuer.issue(user).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), user);
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new(b"secret", 30);
        let token = issuer.issue_with_expiry(Uuid::new_v4(), Utc::now().timestamp() - 60);
        assert!(matches!(issuer.verify(&token), Err(AppError::Unauthenticated(_))));
    }

    #[test]
    fn garbled_or_foreign_tokens_are_rejected() {
        let issuer = TokenIssuer::new(b"secret", 30);
        assert!(issuer.verify("not-a-jwt").is_err());

        let foreign = TokenIssuer::new(b"other", 30).issue(Uuid::new_v4()).unwrap();
        assert!(issuer.verify(&foreign).is_err());
    }
}

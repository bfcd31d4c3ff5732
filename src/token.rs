//! Signed, time-bound identity tokens (HS256 JWT)

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TokenError;

/// Claims embedded in every token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the user the token was issued to
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies bearer tokens
///
/// The secret is fixed for the lifetime of the process. Tokens are stateless:
/// expiry is the only way one stops being accepted.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, owner_id: &str) -> Result<String, TokenError> {
        self.issue_at(owner_id, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, owner_id: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: owner_id.to_owned(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Returns the owner id carried by a valid token.
    ///
    /// Tampering, malformed payloads and expiry are all reported as
    /// [`TokenError::Invalid`].
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            TokenError::Invalid
        })?;

        if data.claims.sub.is_empty() {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(b"test-secret", Duration::minutes(60))
    }

    #[test]
    fn verify_returns_owner_right_after_issue() {
        let tokens = service();
        let token = tokens.issue("user-1").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "user-1");
    }

    #[test]
    fn token_within_ttl_is_accepted() {
        let tokens = service();
        let token = tokens
            .issue_at("user-1", Utc::now() - Duration::minutes(59))
            .unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "user-1");
    }

    #[test]
    fn expired_token_is_invalid() {
        let tokens = service();
        let token = tokens
            .issue_at("user-1", Utc::now() - Duration::minutes(61))
            .unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn altered_byte_is_invalid() {
        let tokens = service();
        let token = tokens.issue("user-1").unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        // flip one character in the middle of each segment
        let mut offset = 0;
        for segment in &segments {
            let position = offset + segment.len() / 2;
            let mut bytes = token.clone().into_bytes();
            bytes[position] = if bytes[position] == b'A' { b'B' } else { b'A' };
            let altered = String::from_utf8(bytes).unwrap();

            assert!(
                matches!(tokens.verify(&altered), Err(TokenError::Invalid)),
                "altered token at byte {} was accepted",
                position
            );
            offset += segment.len() + 1;
        }
    }

    #[test]
    fn token_from_other_secret_is_invalid() {
        let other = TokenService::new(b"another-secret", Duration::minutes(60));
        let token = other.issue("user-1").unwrap();
        assert!(matches!(service().verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn garbage_is_invalid() {
        let tokens = service();
        assert!(matches!(tokens.verify(""), Err(TokenError::Invalid)));
        assert!(matches!(tokens.verify("abc.def.ghi"), Err(TokenError::Invalid)));
    }
}

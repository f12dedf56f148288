//! Short-lived service tokens attached to outbound events.
//!
//! Tokens are HS256 JWTs signed with a secret shared between this service
//! and its subscribers. They assert service identity only: the claims carry
//! the issuing service name and a five minute validity window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Service name carried in every token this service issues.
pub const SERVICE_NAME: &str = "orders-api";

/// How long an issued token stays valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Claims carried by a service token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub service: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Mints service tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    service: String,
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issues a token valid from now for [`TOKEN_TTL`].
    pub fn issue(&self) -> Result<String, TokenError> {
        self.issue_at(Utc::now())
    }

    /// Issues a token valid from `now` for [`TOKEN_TTL`].
    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = ServiceClaims {
            service: self.service.clone(),
            iat,
            exp: iat + TOKEN_TTL.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Checks service tokens. Used by subscribers and by tests.
#[derive(Clone)]
pub struct TokenVerifier {
    expected_service: String,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            expected_service: SERVICE_NAME.to_string(),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Verifies `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<ServiceClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verifies `token` as of `now`.
    ///
    /// A token is expired from its `exp` second onward; no leeway is applied.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<ServiceClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<ServiceClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        if claims.service != self.expected_service {
            return Err(TokenError::WrongService {
                expected: self.expected_service.clone(),
                actual: claims.service,
            });
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("expected_service", &self.expected_service)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[test]
    fn test_issue_and_verify() {
        let token = TokenIssuer::new(SECRET).issue().unwrap();
        let claims = TokenVerifier::new(SECRET).verify(&token).unwrap();

        assert_eq!(claims.service, "orders-api");
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn test_token_valid_within_window() {
        let token = TokenIssuer::new(SECRET).issue_at(at(0)).unwrap();
        let verifier = TokenVerifier::new(SECRET);

        assert!(verifier.verify_at(&token, at(1)).is_ok());
        assert!(verifier.verify_at(&token, at(4)).is_ok());
    }

    #[test]
    fn test_token_expires_after_five_minutes() {
        let token = TokenIssuer::new(SECRET).issue_at(at(0)).unwrap();
        let verifier = TokenVerifier::new(SECRET);

        assert!(matches!(
            verifier.verify_at(&token, at(5)),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            verifier.verify_at(&token, at(6)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenIssuer::new(SECRET).issue().unwrap();
        let result = TokenVerifier::new("some-other-secret-of-similar-length!!").verify(&token);

        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_malformed_token_is_rejected() {
        let result = TokenVerifier::new(SECRET).verify("not-a-jwt");
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_debug_hides_keys() {
        let debug = format!("{:?}", TokenIssuer::new(SECRET));
        assert!(!debug.contains(SECRET));
    }
}

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access tokens live for a week; refresh tokens get the larger window.
const ACCESS_TTL_DAYS: i64 = 7;
const REFRESH_TTL_DAYS: i64 = 30;

/// Claims carried by every kejani bearer token.
///
/// `sub` is the account email. Timestamps are UNIX seconds, matching what
/// `jsonwebtoken` serializes natively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature did not verify against the configured secret.
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token could not be decoded at all (not a JWT, bad base64, bad JSON).
    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("token issuer mismatch")]
    BadIssuer,

    #[error("token audience mismatch")]
    BadAudience,

    #[error("token subject is empty")]
    EmptySubject,

    /// Signing failed; only possible with a broken key configuration.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Signs and verifies HS256 bearer tokens pinned to one issuer/audience pair.
///
/// Verification checks the signature first, then independently re-checks
/// expiry, issuer, and audience against wall-clock time so that each failure
/// surfaces as its own [`TokenError`] kind. Issuer/audience pinning prevents
/// token confusion across environments sharing a secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Issue an access token for `subject`, expiring in 7 days.
    pub fn issue_access(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, Duration::days(ACCESS_TTL_DAYS))
    }

    /// Issue a refresh token for `subject`, expiring in 30 days.
    pub fn issue_refresh(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, Duration::days(REFRESH_TTL_DAYS))
    }

    fn issue(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Decode and verify a token, then re-check expiry/issuer/audience.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        // Claim checks are done by hand below so each failure keeps its kind.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })?;
        let claims = data.claims;

        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.iss != self.issuer {
            return Err(TokenError::BadIssuer);
        }
        if claims.aud != self.audience {
            return Err(TokenError::BadAudience);
        }
        if claims.sub.is_empty() {
            return Err(TokenError::EmptySubject);
        }
        Ok(claims)
    }
}

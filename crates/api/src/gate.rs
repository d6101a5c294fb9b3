use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use thiserror::Error;

use kejani_auth::{TokenCodec, TokenError};
use kejani_store::{Account, AccountStore, StoreError};

use crate::envelope::Envelope;
use crate::validate;

/// Header carrying the bearer credential.
pub const ACCESS_TOKEN_HEADER: &str = "access-token";

/// Terminal outcomes of the request gate. Each maps to exactly one status
/// code and one envelope; the `Result` shape makes a second response write
/// unrepresentable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Access token missing")]
    MissingCredential,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Invalid access token")]
    MalformedToken,

    #[error("User does not exist")]
    AccountNotFound,

    #[error("Account not verified")]
    AccountUnverified,

    #[error("Not enough permissions")]
    InsufficientRole,

    #[error("Request body is too large [{size_kb} kb]")]
    PayloadTooLarge { size_kb: usize },

    #[error("{task}: missing required fields [{}]", fields.join(", "))]
    MissingRequiredFields { task: &'static str, fields: Vec<String> },

    #[error("Error occurred try again")]
    StorageFailure,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::MissingCredential
            | GateError::InvalidOrExpiredToken
            | GateError::AccountUnverified
            | GateError::InsufficientRole => StatusCode::UNAUTHORIZED,
            GateError::MalformedToken | GateError::MissingRequiredFields { .. } => {
                StatusCode::BAD_REQUEST
            }
            GateError::AccountNotFound => StatusCode::NOT_FOUND,
            GateError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        Envelope::new(self.status(), self.to_string()).into_response()
    }
}

impl From<TokenError> for GateError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired | TokenError::InvalidSignature => GateError::InvalidOrExpiredToken,
            _ => GateError::MalformedToken,
        }
    }
}

/// The chokepoint every protected request passes through before business
/// logic: credential presence, token verification, subject resolution,
/// verified-state check, role check, body size, required fields — in that
/// order, so unauthenticated callers learn nothing about accounts and
/// malformed bodies never reach role logic.
///
/// The gate holds no shared mutable state, performs no retries, caches
/// nothing, and never mutates the account: the same token and account state
/// always produce the same decision.
pub struct Gate {
    codec: TokenCodec,
    accounts: Arc<dyn AccountStore>,
    max_body_kb: usize,
}

impl Gate {
    pub fn new(codec: TokenCodec, accounts: Arc<dyn AccountStore>, max_body_kb: usize) -> Self {
        Self {
            codec,
            accounts,
            max_body_kb,
        }
    }

    /// Authenticated variant: the caller's handler runs only on `Ok`, with
    /// the resolved account.
    pub async fn authorize(
        &self,
        task: &'static str,
        headers: &HeaderMap,
        body: &Map<String, Value>,
        required_role: &str,
        required_fields: &[&str],
    ) -> Result<Account, GateError> {
        tracing::debug!(task, "gate: request received");

        let token = headers
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if token.is_empty() {
            return Err(GateError::MissingCredential);
        }

        let claims = self.codec.verify(token).map_err(|e| {
            tracing::warn!(task, error = %e, "gate: token rejected");
            GateError::from(e)
        })?;

        let account = self
            .accounts
            .find_by_email(&claims.sub)
            .await
            .map_err(|e: StoreError| {
                tracing::error!(task, error = %e, "gate: account lookup failed");
                GateError::StorageFailure
            })?
            .ok_or(GateError::AccountNotFound)?;

        if !account.verified {
            return Err(GateError::AccountUnverified);
        }
        if !account.roles.satisfies(required_role) {
            return Err(GateError::InsufficientRole);
        }

        self.check_body(task, body, required_fields)?;
        Ok(account)
    }

    /// Pre-authentication variant (login, bootstrap, password reset): body
    /// size and required fields only.
    pub fn check_open(
        &self,
        task: &'static str,
        body: &Map<String, Value>,
        required_fields: &[&str],
    ) -> Result<(), GateError> {
        tracing::debug!(task, "gate: open request received");
        self.check_body(task, body, required_fields)
    }

    fn check_body(
        &self,
        task: &'static str,
        body: &Map<String, Value>,
        required_fields: &[&str],
    ) -> Result<(), GateError> {
        let size_kb = validate::body_size_kb(body);
        if size_kb > self.max_body_kb {
            return Err(GateError::PayloadTooLarge { size_kb });
        }
        let missing = validate::missing_fields(body, required_fields);
        if !missing.is_empty() {
            return Err(GateError::MissingRequiredFields {
                task,
                fields: missing.iter().map(|f| f.to_string()).collect(),
            });
        }
        Ok(())
    }
}

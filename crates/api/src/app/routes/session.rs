use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use kejani_store::Collection;

use super::{as_object, store_error};
use crate::app::AppState;
use crate::envelope::Envelope;

pub fn router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/password-reset/request", post(request_password_reset))
        .route("/password-reset/confirm", post(confirm_password_reset))
}

/// Pre-auth: verifies the password and issues the access/refresh pair. The
/// refresh token is persisted as a session record so logout can invalidate it.
async fn login(Extension(state): Extension<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let body = as_object(body);
    if let Err(e) = state.gate.check_open("login", &body, &["email", "password"]) {
        return e.into_response();
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();

    let user = match state
        .store
        .find_one(Collection::AppUsers, json!({ "email": email }))
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return Envelope::new(StatusCode::NOT_FOUND, "User does not exist").into_response(),
        Err(e) => return store_error("login", e),
    };

    let hash = user.get("password").and_then(Value::as_str).unwrap_or_default();
    if !bcrypt::verify(password, hash).unwrap_or(false) {
        return Envelope::new(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let (access, refresh) = match (state.codec.issue_access(email), state.codec.issue_refresh(email)) {
        (Ok(access), Ok(refresh)) => (access, refresh),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "login: token issuance failed");
            return Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again")
                .into_response();
        }
    };

    if let Err(e) = state
        .store
        .save(
            Collection::Sessions,
            json!({ "email": email, "refreshToken": refresh }),
        )
        .await
    {
        return store_error("login", e);
    }

    (
        [
            ("access-token", access.clone()),
            ("refresh-token", refresh.clone()),
        ],
        Envelope::with_payload(
            StatusCode::OK,
            "Login successful",
            json!({ "accessToken": access, "refreshToken": refresh }),
        ),
    )
        .into_response()
}

/// Deletes the caller's session record, invalidating the refresh token.
async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("logout", &headers, &body, "user", &["email"])
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email != account.email {
        return Envelope::new(StatusCode::BAD_REQUEST, "Operation not allowed").into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::Sessions, json!({ "email": email }))
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Logout successful").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Session not found").into_response(),
        Err(e) => store_error("logout", e),
    }
}

async fn request_password_reset(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state.gate.check_open("requestPasswordReset", &body, &["email"]) {
        return e.into_response();
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();

    match state
        .store
        .find_one(Collection::AppUsers, json!({ "email": email }))
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Envelope::new(StatusCode::NOT_FOUND, "User not found").into_response(),
        Err(e) => return store_error("requestPasswordReset", e),
    }

    let code = Uuid::new_v4().to_string();
    if let Err(e) = state
        .store
        .save(Collection::ResetCodes, json!({ "email": email, "code": code }))
        .await
    {
        return store_error("requestPasswordReset", e);
    }

    let link = format!("{}/password-reset?email={email}&code={code}", state.config.host_url);
    if let Err(e) = state
        .mailer
        .send(
            email,
            "Password Reset",
            "Click on the link to reset your password",
            Some(&format!("Click <a href=\"{link}\">here</a> to reset your password")),
        )
        .await
    {
        tracing::error!(error = %e, "requestPasswordReset: mail send failed");
        return Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again")
            .into_response();
    }

    Envelope::new(StatusCode::OK, "Password reset email sent to your inbox").into_response()
}

async fn confirm_password_reset(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state
        .gate
        .check_open("confirmPasswordReset", &body, &["email", "code", "password"])
    {
        return e.into_response();
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();

    match state
        .store
        .find_one(Collection::ResetCodes, json!({ "email": email, "code": code }))
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Envelope::new(StatusCode::NOT_FOUND, "Reset code not found or already used")
                .into_response()
        }
        Err(e) => return store_error("confirmPasswordReset", e),
    }

    let hash = match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "confirmPasswordReset: hashing failed");
            return Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again")
                .into_response();
        }
    };

    match state
        .store
        .find_and_update(
            Collection::AppUsers,
            json!({ "email": email }),
            json!({ "$set": { "password": hash } }),
        )
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Envelope::new(StatusCode::NOT_FOUND, "User not found").into_response(),
        Err(e) => return store_error("confirmPasswordReset", e),
    }

    // The code is single-use.
    if let Err(e) = state
        .store
        .find_one_and_delete(Collection::ResetCodes, json!({ "email": email, "code": code }))
        .await
    {
        tracing::warn!(error = %e, "confirmPasswordReset: failed to burn reset code");
    }

    Envelope::new(StatusCode::OK, "Password updated successfully").into_response()
}

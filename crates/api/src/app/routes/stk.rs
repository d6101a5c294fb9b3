use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use kejani_store::Collection;

use super::{as_object, store_error};
use crate::app::AppState;
use crate::envelope::Envelope;
use crate::mpesa::MpesaClient;

pub fn router() -> Router {
    Router::new()
        .route("/stk-push", post(push))
        .route("/stk/register", post(register))
        .route("/stk/callback", post(callback))
}

fn amount_of(body: &serde_json::Map<String, Value>) -> Option<u64> {
    match body.get("amount") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Fires an STK payment prompt to the caller's registered phone.
async fn push(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("stkPush", &headers, &body, "user", &["amount"])
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let amount = match amount_of(&body) {
        Some(amount) if amount >= 1 => amount,
        _ => {
            return Envelope::new(StatusCode::BAD_REQUEST, "Amount cannot be less than 1")
                .into_response()
        }
    };

    let phone = match account.phone.as_deref() {
        Some(phone) => phone,
        None => {
            return Envelope::new(StatusCode::BAD_REQUEST, "No phone number on record")
                .into_response()
        }
    };
    let msisdn = match MpesaClient::sanitize_msisdn(phone) {
        Ok(msisdn) => msisdn,
        Err(e) => {
            tracing::warn!(error = %e, "stkPush: unusable phone number");
            return Envelope::new(StatusCode::BAD_REQUEST, "Phone number is not valid")
                .into_response();
        }
    };

    let timestamp = MpesaClient::timestamp(Utc::now());
    let reference: String = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    let payload = json!({
        "BusinessShortCode": state.mpesa.business_short_code(),
        "Password": state.mpesa.password(&timestamp),
        "Timestamp": timestamp,
        "TransactionType": "CustomerPayBillOnline",
        "Amount": amount,
        "PartyA": msisdn,
        "PartyB": state.mpesa.business_short_code(),
        "PhoneNumber": msisdn,
        "CallBackURL": state.mpesa.callback_url(),
        "AccountReference": format!("Kejani-{reference}"),
        "TransactionDesc": "Rent",
    });

    let reply = match state.mpesa.express(payload).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "stkPush: express request failed");
            return Envelope::new(
                StatusCode::BAD_GATEWAY,
                "Payment processing failed. Try again",
            )
            .into_response();
        }
    };

    let accepted = reply.get("ResponseCode").and_then(Value::as_str) == Some("0");
    if accepted {
        Envelope::new(
            StatusCode::OK,
            "Payment processing. You will receive a payment prompt shortly on your phone",
        )
        .into_response()
    } else {
        tracing::warn!(?reply, "stkPush: express request rejected");
        Envelope::new(StatusCode::OK, "Payment request was not accepted. Try again")
            .into_response()
    }
}

/// Registers this deployment's confirmation/validation URLs with the payment
/// gateway. One-time setup, admin only.
async fn register(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state
        .gate
        .authorize("registerCallback", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    let payload = json!({
        "ShortCode": state.mpesa.business_short_code(),
        "ResponseType": "Completed",
        "ConfirmationURL": state.mpesa.callback_url(),
        "ValidationURL": state.mpesa.callback_url(),
    });

    let reply = match state.mpesa.register_callback(payload).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "registerCallback: request failed");
            return Envelope::new(
                StatusCode::BAD_GATEWAY,
                "Callback registration failed. Try again",
            )
            .into_response();
        }
    };

    let ok = reply
        .get("ResponseDescription")
        .and_then(Value::as_str)
        .map(|d| d.to_lowercase().contains("success"))
        .unwrap_or(false);
    if ok {
        Envelope::new(StatusCode::OK, "Callback registered successfully").into_response()
    } else {
        tracing::error!(?reply, "registerCallback: gateway rejected registration");
        Envelope::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Callback registration failed. Try again",
        )
        .into_response()
    }
}

/// Receives gateway confirmations. No token: the gateway is not a user.
/// Payloads are persisted verbatim for reconciliation.
async fn callback(Extension(state): Extension<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    tracing::info!("stk callback received");
    match state.store.save(Collection::Callbacks, body).await {
        Ok(_) => Envelope::new(StatusCode::OK, "Callback received").into_response(),
        Err(e) => store_error("stkCallback", e),
    }
}

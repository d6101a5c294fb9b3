use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use kejani_store::Collection;

use super::{as_object, bad_page_param, page_skip, paging, store_error, PAGE_SIZE};
use crate::app::AppState;
use crate::envelope::Envelope;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:key", get(list).put(update).delete(delete_payment))
}

const CREATE_FIELDS: &[&str] = &["title", "description", "transactionCode", "amount"];

/// Tenants self-report payments; they stay unverified until reconciled.
async fn create(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("createPayment", &headers, &body, "user", CREATE_FIELDS)
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let mut doc = Value::Object(body);
    doc["from"] = json!(account.email);
    doc["verified"] = json!(false);
    doc["dateCreated"] = json!(Utc::now().timestamp_millis());

    match state.store.save(Collection::Payments, doc).await {
        Ok(_) => Envelope::new(StatusCode::CREATED, "Payment recorded successfully").into_response(),
        Err(e) => store_error("createPayment", e),
    }
}

/// GET /payments/:key where `key` is the 1-based page number.
async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("listPayments", &headers, &body, "user", &[])
        .await
    {
        return e.into_response();
    }
    let page: u64 = match key.parse() {
        Ok(page) => page,
        Err(_) => return bad_page_param(),
    };

    let pipeline = vec![
        json!({ "$sort": { "dateCreated": -1 } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state.store.aggregate(Collection::Payments, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Payments retrieved successfully",
            json!({ "data": data, "pagination": paging(page, true) }),
        )
        .into_response(),
        Err(e) => store_error("listPayments", e),
    }
}

/// PUT /payments/:key. Callers may only touch their own records, and the
/// amount and verification flag are not theirs to change.
async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(_key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize(
            "updatePayment",
            &headers,
            &body,
            "user",
            &["from", "transactionCode"],
        )
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let from = body.get("from").and_then(Value::as_str).unwrap_or_default();
    if from != account.email {
        return Envelope::new(StatusCode::BAD_REQUEST, "Operation not allowed").into_response();
    }
    let code = body
        .get("transactionCode")
        .cloned()
        .unwrap_or_default();

    let mut changes = body.clone();
    changes.remove("amount");
    changes.remove("verified");

    match state
        .store
        .find_and_update(
            Collection::Payments,
            json!({ "from": from, "transactionCode": code }),
            json!({ "$set": Value::Object(changes) }),
        )
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Payment updated successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Payment not found").into_response(),
        Err(e) => store_error("updatePayment", e),
    }
}

/// DELETE /payments/:key keyed by transaction code.
async fn delete_payment(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("deletePayment", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::Payments, json!({ "transactionCode": key }))
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Payment deleted successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Payment not found").into_response(),
        Err(e) => store_error("deletePayment", e),
    }
}

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
        .route("/:key", get(list).put(update).delete(delete_tenant))
}

/// Links a registered user to a house. Both sides must already exist.
async fn create(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("createTenant", &headers, &body, "admin", &["user", "house"])
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let user = body.get("user").and_then(Value::as_str).unwrap_or_default();
    let house = body.get("house").cloned().unwrap_or_default();

    match state
        .store
        .find_one(Collection::AppUsers, json!({ "email": user }))
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Envelope::new(StatusCode::NOT_FOUND, "User does not exist").into_response(),
        Err(e) => return store_error("createTenant", e),
    }
    match state
        .store
        .find_one(Collection::Houses, json!({ "houseNumber": house }))
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Envelope::new(StatusCode::NOT_FOUND, "House not found").into_response(),
        Err(e) => return store_error("createTenant", e),
    }

    let doc = json!({
        "client": user,
        "house": house,
        "createdBy": account.email,
        "createdOn": Utc::now().timestamp_millis(),
    });
    match state.store.save(Collection::Tenants, doc).await {
        Ok(_) => Envelope::new(StatusCode::CREATED, "Tenant created successfully").into_response(),
        Err(e) => store_error("createTenant", e),
    }
}

/// GET /tenants/:key where `key` is the 1-based page number.
async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("listTenants", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }
    let page: u64 = match key.parse() {
        Ok(page) => page,
        Err(_) => return bad_page_param(),
    };

    let pipeline = vec![
        json!({ "$sort": { "createdOn": -1 } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state.store.aggregate(Collection::Tenants, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Tenants retrieved successfully",
            json!({ "data": data, "pagination": paging(page, true) }),
        )
        .into_response(),
        Err(e) => store_error("listTenants", e),
    }
}

/// PUT /tenants/:key keyed by the tenant's client email.
async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state
        .gate
        .authorize("updateTenant", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_and_update(
            Collection::Tenants,
            json!({ "client": key }),
            json!({ "$set": Value::Object(body) }),
        )
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Tenant updated successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Tenant not found").into_response(),
        Err(e) => store_error("updateTenant", e),
    }
}

async fn delete_tenant(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("deleteTenant", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::Tenants, json!({ "client": key }))
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Tenant deleted successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Tenant not found").into_response(),
        Err(e) => store_error("deleteTenant", e),
    }
}

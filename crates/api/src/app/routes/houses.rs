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
        .route("/:key", get(list).put(update).delete(delete_house))
        .route("/search/:term/:page", get(search))
}

const CREATE_FIELDS: &[&str] = &["houseNumber", "rent", "deposit", "floorNumber"];

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("createHouse", &headers, &body, "admin", CREATE_FIELDS)
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let house_number = body.get("houseNumber").cloned().unwrap_or_default();
    match state
        .store
        .find_one(Collection::Houses, json!({ "houseNumber": house_number }))
        .await
    {
        Ok(Some(_)) => {
            return Envelope::new(StatusCode::CONFLICT, "House already exists").into_response()
        }
        Ok(None) => {}
        Err(e) => return store_error("createHouse", e),
    }

    let mut doc = Value::Object(body);
    doc["addedBy"] = json!(account.email);
    doc["occupied"] = json!(false);
    doc["createdOn"] = json!(Utc::now().timestamp_millis());

    match state.store.save(Collection::Houses, doc).await {
        Ok(_) => Envelope::new(StatusCode::CREATED, "House created successfully").into_response(),
        Err(e) => store_error("createHouse", e),
    }
}

/// GET /houses/:key where `key` is the 1-based page number.
async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("listHouses", &headers, &body, "admin", &[])
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
    match state.store.aggregate(Collection::Houses, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Houses retrieved successfully",
            json!({ "data": data, "pagination": paging(page, true) }),
        )
        .into_response(),
        Err(e) => store_error("listHouses", e),
    }
}

async fn search(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path((term, page)): Path<(String, u64)>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("searchHouses", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    if let Err(e) = state
        .store
        .create_index(Collection::Houses, json!({ "houseNumber": "text" }))
        .await
    {
        return store_error("searchHouses", e);
    }

    let pipeline = vec![
        json!({ "$match": { "$text": { "$search": term } } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state.store.aggregate(Collection::Houses, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Houses retrieved successfully",
            json!({ "data": data, "pagination": paging(page, false) }),
        )
        .into_response(),
        Err(e) => store_error("searchHouses", e),
    }
}

/// PUT /houses/:key keyed by house number.
async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state
        .gate
        .authorize("updateHouse", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_and_update(
            Collection::Houses,
            json!({ "houseNumber": key }),
            json!({ "$set": Value::Object(body) }),
        )
        .await
    {
        Ok(Some(updated)) => {
            Envelope::with_payload(StatusCode::OK, "House updated successfully", updated)
                .into_response()
        }
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "House not found").into_response(),
        Err(e) => store_error("updateHouse", e),
    }
}

async fn delete_house(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("deleteHouse", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::Houses, json!({ "houseNumber": key }))
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Deleted house successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "House not found").into_response(),
        Err(e) => store_error("deleteHouse", e),
    }
}

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use kejani_store::Collection;

use super::{as_object, bad_page_param, page_skip, paging, store_error, PAGE_SIZE};
use crate::app::AppState;
use crate::envelope::Envelope;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:key", get(list).put(update).delete(delete_communication))
        .route("/search/:term/:page", get(search))
}

const CREATE_FIELDS: &[&str] = &["to", "title", "description", "opened"];

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("createCommunication", &headers, &body, "user", CREATE_FIELDS)
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let mut doc = Value::Object(body);
    doc["id"] = json!(Uuid::new_v4().to_string());
    doc["createdBy"] = json!(account.email);
    doc["dateCreated"] = json!(Utc::now().timestamp_millis());

    match state.store.save(Collection::Communications, doc).await {
        Ok(_) => {
            Envelope::new(StatusCode::CREATED, "Communication created successfully").into_response()
        }
        Err(e) => store_error("createCommunication", e),
    }
}

/// GET /communications/:key where `key` is the 1-based page number. The
/// recipient's user record rides along under `user`.
async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("listCommunications", &headers, &body, "user", &[])
        .await
    {
        return e.into_response();
    }
    let page: u64 = match key.parse() {
        Ok(page) => page,
        Err(_) => return bad_page_param(),
    };

    let pipeline = vec![
        json!({ "$lookup": {
            "from": "app_users",
            "localField": "to",
            "foreignField": "email",
            "as": "user",
        } }),
        json!({ "$unwind": { "path": "$user", "preserveNullAndEmptyArrays": true } }),
        json!({ "$project": {
            "id": 1,
            "to": 1,
            "title": 1,
            "description": 1,
            "opened": 1,
            "createdBy": 1,
            "dateCreated": 1,
            "recipientName": "$user.username",
        } }),
        json!({ "$sort": { "dateCreated": -1 } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state
        .store
        .aggregate(Collection::Communications, pipeline)
        .await
    {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Communications retrieved successfully",
            json!({ "data": data, "pagination": paging(page, true) }),
        )
        .into_response(),
        Err(e) => store_error("listCommunications", e),
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
        .authorize("searchCommunications", &headers, &body, "user", &[])
        .await
    {
        return e.into_response();
    }

    if let Err(e) = state
        .store
        .create_index(
            Collection::Communications,
            json!({ "title": "text", "description": "text" }),
        )
        .await
    {
        return store_error("searchCommunications", e);
    }

    let pipeline = vec![
        json!({ "$match": { "$text": { "$search": term } } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state
        .store
        .aggregate(Collection::Communications, pipeline)
        .await
    {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Communications retrieved successfully",
            json!({ "data": data, "pagination": paging(page, false) }),
        )
        .into_response(),
        Err(e) => store_error("searchCommunications", e),
    }
}

/// PUT /communications/:key keyed by the communication's own id.
async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state
        .gate
        .authorize("updateCommunication", &headers, &body, "user", &["to"])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_and_update(
            Collection::Communications,
            json!({ "id": key }),
            json!({ "$set": Value::Object(body) }),
        )
        .await
    {
        Ok(Some(_)) => {
            Envelope::new(StatusCode::OK, "Communication updated successfully").into_response()
        }
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Communication not found").into_response(),
        Err(e) => store_error("updateCommunication", e),
    }
}

async fn delete_communication(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("deleteCommunication", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::Communications, json!({ "id": key }))
        .await
    {
        Ok(Some(_)) => {
            Envelope::new(StatusCode::OK, "Communication deleted successfully").into_response()
        }
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Communication not found").into_response(),
        Err(e) => store_error("deleteCommunication", e),
    }
}

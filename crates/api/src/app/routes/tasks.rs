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
        .route("/:key", get(list).put(update).delete(delete_task))
        .route("/search/:term/:page", get(search))
}

const CREATE_FIELDS: &[&str] = &["to", "title", "description", "scheduleDate"];

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("createTask", &headers, &body, "admin", CREATE_FIELDS)
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let mut doc = Value::Object(body);
    doc["createdBy"] = json!(account.email);
    doc["status"] = json!("pending");
    doc["createdOn"] = json!(Utc::now().timestamp_millis());

    match state.store.save(Collection::Tasks, doc).await {
        Ok(_) => Envelope::new(StatusCode::CREATED, "Task created successfully").into_response(),
        Err(e) => store_error("createTask", e),
    }
}

/// GET /tasks/:key where `key` is the 1-based page number. Assignee and
/// creator records are joined in so clients render names without a second
/// round trip.
async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("listTasks", &headers, &body, "user", &[])
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
            "as": "assignee",
        } }),
        json!({ "$unwind": { "path": "$assignee", "preserveNullAndEmptyArrays": true } }),
        json!({ "$lookup": {
            "from": "app_users",
            "localField": "createdBy",
            "foreignField": "email",
            "as": "creator",
        } }),
        json!({ "$unwind": { "path": "$creator", "preserveNullAndEmptyArrays": true } }),
        json!({ "$project": {
            "title": 1,
            "description": 1,
            "scheduleDate": 1,
            "status": 1,
            "createdOn": 1,
            "to": 1,
            "createdBy": 1,
            "assigneeName": "$assignee.username",
            "creatorName": "$creator.username",
        } }),
        json!({ "$sort": { "createdOn": -1 } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state.store.aggregate(Collection::Tasks, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Tasks retrieved successfully",
            json!({ "data": data, "pagination": paging(page, true) }),
        )
        .into_response(),
        Err(e) => store_error("listTasks", e),
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
        .authorize("searchTasks", &headers, &body, "user", &[])
        .await
    {
        return e.into_response();
    }

    if let Err(e) = state
        .store
        .create_index(Collection::Tasks, json!({ "title": "text", "description": "text" }))
        .await
    {
        return store_error("searchTasks", e);
    }

    let pipeline = vec![
        json!({ "$match": { "$text": { "$search": term } } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
    ];
    match state.store.aggregate(Collection::Tasks, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Tasks retrieved successfully",
            json!({ "data": data, "pagination": paging(page, false) }),
        )
        .into_response(),
        Err(e) => store_error("searchTasks", e),
    }
}

/// PUT /tasks/:key updates the document with that id.
async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    if let Err(e) = state
        .gate
        .authorize("updateTask", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_and_update(
            Collection::Tasks,
            json!({ "_id": key }),
            json!({ "$set": Value::Object(body) }),
        )
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Task updated successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Task not found").into_response(),
        Err(e) => store_error("updateTask", e),
    }
}

async fn delete_task(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("deleteTask", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::Tasks, json!({ "_id": key }))
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "Task deleted successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "Task not found").into_response(),
        Err(e) => store_error("deleteTask", e),
    }
}

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
        .route("/users", post(create))
        .route("/users/admin", post(create_admin))
        .route("/users/:key", get(list).put(update).delete(delete_user))
        .route("/users/search/:term/:page", get(search))
        .route("/users/activate/:email/:code", get(activate))
}

const CREATE_FIELDS: &[&str] = &[
    "username",
    "email",
    "phone",
    "idNumber",
    "password",
    "profileImage",
];

/// Admins register accounts; the new account starts unverified with the
/// base role and receives an activation link by mail.
async fn create(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("createUser", &headers, &body, "admin", CREATE_FIELDS)
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    match state
        .store
        .find_one(Collection::AppUsers, json!({ "email": email }))
        .await
    {
        Ok(Some(_)) => {
            return Envelope::new(StatusCode::CONFLICT, "User already exists").into_response()
        }
        Ok(None) => {}
        Err(e) => return store_error("createUser", e),
    }

    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    let hash = match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "createUser: hashing failed");
            return Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again")
                .into_response();
        }
    };

    let mut doc = Value::Object(body.clone());
    doc["password"] = json!(hash);
    doc["addedBy"] = json!(account.email);
    doc["verified"] = json!(false);
    doc["roles"] = json!({ "user": true });
    doc["addedOn"] = json!(Utc::now().timestamp_millis());

    if let Err(e) = state.store.save(Collection::AppUsers, doc).await {
        return store_error("createUser", e);
    }

    let code = Uuid::new_v4().to_string();
    if let Err(e) = state
        .store
        .save(
            Collection::ActivationCodes,
            json!({ "owner": email, "code": code }),
        )
        .await
    {
        return store_error("createUser", e);
    }

    let link = format!("{}/users/activate/{email}/{code}", state.config.host_url);
    if let Err(e) = state
        .mailer
        .send(
            email,
            "Account Activation",
            "Click on the link to activate your account",
            Some(&format!("Click <a href=\"{link}\">here</a> to activate your account")),
        )
        .await
    {
        tracing::error!(error = %e, "createUser: activation mail failed");
        return Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again")
            .into_response();
    }

    Envelope::new(
        StatusCode::CREATED,
        "User created successfully, now attach roles",
    )
    .into_response()
}

const ADMIN_FIELDS: &[&str] = &[
    "firstName",
    "lastName",
    "username",
    "email",
    "phone",
    "idNumber",
    "password",
    "profileImage",
];

/// Bootstrap endpoint: creates a verified account holding the full role set.
/// Open by design so a fresh deployment can mint its first administrator.
async fn create_admin(Extension(state): Extension<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let body = as_object(body);
    if let Err(e) = state.gate.check_open("createAdmin", &body, ADMIN_FIELDS) {
        return e.into_response();
    }

    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    match state
        .store
        .find_one(Collection::AppUsers, json!({ "email": email }))
        .await
    {
        Ok(Some(_)) => {
            return Envelope::new(StatusCode::CONFLICT, "User already exists").into_response()
        }
        Ok(None) => {}
        Err(e) => return store_error("createAdmin", e),
    }

    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    let hash = match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "createAdmin: hashing failed");
            return Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again")
                .into_response();
        }
    };

    let mut doc = Value::Object(body.clone());
    doc["password"] = json!(hash);
    doc["verified"] = json!(true);
    doc["roles"] = json!({ "user": true, "admin": true, "manager": true });
    doc["addedOn"] = json!(Utc::now().timestamp_millis());

    if let Err(e) = state.store.save(Collection::AppUsers, doc).await {
        return store_error("createAdmin", e);
    }

    Envelope::new(StatusCode::CREATED, "Admin created successfully").into_response()
}

/// GET /users/:key where `key` is the 1-based page number.
async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("listUsers", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }
    let page: u64 = match key.parse() {
        Ok(page) => page,
        Err(_) => return bad_page_param(),
    };

    // Password hashes never leave the store.
    let pipeline = vec![
        json!({ "$sort": { "addedOn": -1 } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
        json!({ "$project": {
            "username": 1,
            "email": 1,
            "phone": 1,
            "idNumber": 1,
            "profileImage": 1,
            "verified": 1,
            "roles": 1,
            "addedBy": 1,
            "addedOn": 1,
        } }),
    ];
    match state.store.aggregate(Collection::AppUsers, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Users retrieved successfully",
            json!({ "data": data, "pagination": paging(page, true) }),
        )
        .into_response(),
        Err(e) => store_error("listUsers", e),
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
        .authorize("searchUsers", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    if let Err(e) = state
        .store
        .create_index(Collection::AppUsers, json!({ "email": "text", "username": "text" }))
        .await
    {
        return store_error("searchUsers", e);
    }

    let pipeline = vec![
        json!({ "$match": { "$text": { "$search": term } } }),
        json!({ "$skip": page_skip(page) }),
        json!({ "$limit": PAGE_SIZE }),
        json!({ "$project": {
            "username": 1,
            "email": 1,
            "phone": 1,
            "idNumber": 1,
            "profileImage": 1,
            "verified": 1,
            "roles": 1,
        } }),
    ];
    match state.store.aggregate(Collection::AppUsers, pipeline).await {
        Ok(data) => Envelope::with_payload(
            StatusCode::OK,
            "Users retrieved successfully",
            json!({ "data": data, "pagination": paging(page, false) }),
        )
        .into_response(),
        Err(e) => store_error("searchUsers", e),
    }
}

/// PUT /users/:key updates the document with that id. Changing the `roles`
/// map is an admin-only escalation regardless of which fields came along.
async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let body = as_object(body);
    let account = match state
        .gate
        .authorize("updateUser", &headers, &body, "user", &[])
        .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    if body.contains_key("roles") && !account.roles.satisfies("admin") {
        return Envelope::new(
            StatusCode::UNAUTHORIZED,
            "You don't have permission for this task",
        )
        .into_response();
    }

    match state
        .store
        .find_and_update(
            Collection::AppUsers,
            json!({ "_id": key }),
            json!({ "$set": Value::Object(body) }),
        )
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "User updated successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "User does not exist").into_response(),
        Err(e) => store_error("updateUser", e),
    }
}

async fn delete_user(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let body = Default::default();
    if let Err(e) = state
        .gate
        .authorize("deleteUser", &headers, &body, "admin", &[])
        .await
    {
        return e.into_response();
    }

    match state
        .store
        .find_one_and_delete(Collection::AppUsers, json!({ "_id": key }))
        .await
    {
        Ok(Some(_)) => Envelope::new(StatusCode::OK, "User deleted successfully").into_response(),
        Ok(None) => Envelope::new(StatusCode::NOT_FOUND, "User does not exist").into_response(),
        Err(e) => store_error("deleteUser", e),
    }
}

/// Landed from the activation mail link; no token is expected here.
async fn activate(
    Extension(state): Extension<Arc<AppState>>,
    Path((email, code)): Path<(String, String)>,
) -> Response {
    match state
        .store
        .find_one(
            Collection::ActivationCodes,
            json!({ "owner": email, "code": code }),
        )
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Envelope::new(StatusCode::NOT_FOUND, "Activation code already used")
                .into_response()
        }
        Err(e) => return store_error("activateUser", e),
    }

    match state
        .store
        .find_and_update(
            Collection::AppUsers,
            json!({ "email": email }),
            json!({ "$set": { "verified": true } }),
        )
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Envelope::new(StatusCode::NOT_FOUND, "User does not exist").into_response(),
        Err(e) => return store_error("activateUser", e),
    }

    if let Err(e) = state
        .store
        .find_one_and_delete(
            Collection::ActivationCodes,
            json!({ "owner": email, "code": code }),
        )
        .await
    {
        tracing::warn!(error = %e, "activateUser: failed to burn activation code");
    }

    Envelope::new(StatusCode::OK, "User verified successfully").into_response()
}

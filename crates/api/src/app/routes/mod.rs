use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Map, Value};

use kejani_store::StoreError;

use crate::envelope::Envelope;

pub mod communications;
pub mod houses;
pub mod payments;
pub mod session;
pub mod stk;
pub mod tasks;
pub mod tenants;
pub mod users;

/// Listing endpoints page in fixed windows.
pub(crate) const PAGE_SIZE: u64 = 20;

/// One flat registration call per resource module, composed here. Every
/// route group shares the single gate and store carried in the extension.
pub fn router() -> Router {
    Router::new()
        .merge(session::router())
        .merge(users::router())
        .merge(stk::router())
        .nest("/houses", houses::router())
        .nest("/tenants", tenants::router())
        .nest("/payments", payments::router())
        .nest("/tasks", tasks::router())
        .nest("/communications", communications::router())
}

pub(crate) fn as_object(body: Value) -> Map<String, Value> {
    body.as_object().cloned().unwrap_or_default()
}

pub(crate) fn store_error(task: &'static str, error: StoreError) -> Response {
    tracing::error!(task, error = %error, "storage operation failed");
    Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Error occurred try again").into_response()
}

pub(crate) fn bad_page_param() -> Response {
    Envelope::new(StatusCode::BAD_REQUEST, "Expected param pageNumber").into_response()
}

/// Pages are 1-based on the wire.
pub(crate) fn page_skip(page: u64) -> u64 {
    page.saturating_sub(1) * PAGE_SIZE
}

pub(crate) fn paging(page: u64, sorted: bool) -> Value {
    json!({ "page": page.saturating_sub(1), "sorted": sorted })
}

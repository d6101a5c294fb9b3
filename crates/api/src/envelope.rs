use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// The uniform JSON wrapper for every terminal response.
///
/// `code` mirrors the transport status. `payload` is omitted from the wire
/// entirely (not `null`) when absent. Exactly one envelope is produced per
/// request; handlers return it and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(code: StatusCode, message: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            payload: Some(payload.into()),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

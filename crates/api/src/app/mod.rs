use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use kejani_auth::TokenCodec;
use kejani_store::DocumentStore;

use crate::config::AppConfig;
use crate::envelope::Envelope;
use crate::gate::Gate;
use crate::mail::Mailer;
use crate::mpesa::MpesaClient;

pub mod routes;

/// Everything a handler needs, wired once at startup and injected.
///
/// One store handle, one gate, one codec; nothing here is constructed
/// per-request or reached through a global.
pub struct AppState {
    pub gate: Gate,
    pub store: Arc<dyn DocumentStore>,
    pub codec: TokenCodec,
    pub mailer: Arc<dyn Mailer>,
    pub mpesa: Arc<MpesaClient>,
    pub config: AppConfig,
}

/// Compose the full routing tree over a prepared [`AppState`].
///
/// The transport body limit sits a margin above the gate's ceiling: bodies
/// over the ceiling must still be buffered so the gate can answer with its
/// enveloped 413 rather than the collector's plain-text one.
pub fn build_app(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_body_kb
        .saturating_add(1024)
        .saturating_mul(1024);
    let state = Arc::new(state);
    Router::new()
        .route("/", get(ping))
        .merge(routes::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(state))
}

async fn ping(Extension(state): Extension<Arc<AppState>>) -> Envelope {
    Envelope::new(
        StatusCode::OK,
        format!("Server running on port: {}", state.config.port),
    )
}

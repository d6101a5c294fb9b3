use std::sync::Arc;

use anyhow::Context;

use kejani_api::app::{build_app, AppState};
use kejani_api::config::AppConfig;
use kejani_api::gate::Gate;
use kejani_api::mail::LogMailer;
use kejani_api::mpesa::MpesaClient;
use kejani_auth::TokenCodec;
use kejani_store::{Accounts, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kejani_observability::init();

    let config = AppConfig::from_env()?;
    let store = Arc::new(MemoryStore::new());
    let accounts = Arc::new(Accounts::new(store.clone()));
    let codec = TokenCodec::new(
        config.jwt_secret.clone(),
        config.issuer.clone(),
        config.audience.clone(),
    );
    let gate = Gate::new(codec.clone(), accounts, config.max_body_kb);
    let mpesa = Arc::new(MpesaClient::new(config.mpesa.clone()).context("mpesa client")?);

    let app = build_app(AppState {
        gate,
        store,
        codec,
        mailer: Arc::new(LogMailer),
        mpesa,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "server listening");
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::config::MpesaConfig;

#[derive(Debug, Error)]
pub enum MpesaError {
    #[error("mpesa transport error: {0}")]
    Transport(String),

    #[error("unexpected mpesa response: {0}")]
    Protocol(String),

    #[error("invalid msisdn: {0}")]
    BadMsisdn(String),
}

/// Thin Daraja client: OAuth client-credentials, STK push express, and C2B
/// callback registration. Everything else about the protocol stays upstream.
pub struct MpesaClient {
    http: reqwest::Client,
    config: MpesaConfig,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Result<Self, MpesaError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MpesaError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Daraja timestamp format: `yyyyMMddHHmmss`.
    pub fn timestamp(now: DateTime<Utc>) -> String {
        now.format("%Y%m%d%H%M%S").to_string()
    }

    /// STK password: base64 of short code + pass key + timestamp.
    pub fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{timestamp}",
            self.config.business_short_code, self.config.pass_key
        ))
    }

    /// Normalize a Kenyan phone number to its `2547...` integer form.
    pub fn sanitize_msisdn(phone: &str) -> Result<u64, MpesaError> {
        let digits = if let Some(rest) = phone.strip_prefix("+254") {
            format!("254{rest}")
        } else if let Some(rest) = phone.strip_prefix('0') {
            format!("254{rest}")
        } else if phone.starts_with('7') {
            format!("254{phone}")
        } else {
            phone.to_string()
        };
        digits
            .parse::<u64>()
            .map_err(|_| MpesaError::BadMsisdn(phone.to_string()))
    }

    pub fn business_short_code(&self) -> &str {
        &self.config.business_short_code
    }

    pub fn callback_url(&self) -> &str {
        &self.config.callback_url
    }

    async fn authenticate(&self) -> Result<String, MpesaError> {
        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));
        let response: Value = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.base_url
            ))
            .header("Authorization", format!("Basic {credentials}"))
            .send()
            .await
            .map_err(|e| MpesaError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| MpesaError::Transport(e.to_string()))?;

        response
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MpesaError::Protocol("access_token missing from oauth reply".to_string()))
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, MpesaError> {
        let token = self.authenticate().await?;
        self.http
            .post(format!("{}{path}", self.config.base_url))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| MpesaError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| MpesaError::Transport(e.to_string()))
    }

    /// Fire an STK push express request.
    pub async fn express(&self, payload: Value) -> Result<Value, MpesaError> {
        tracing::info!("mpesa: stk express request");
        self.post("/mpesa/stkpush/v1/processrequest", &payload).await
    }

    /// Register the C2B confirmation/validation callback URLs.
    pub async fn register_callback(&self, payload: Value) -> Result<Value, MpesaError> {
        tracing::info!("mpesa: registering c2b callback");
        self.post("/mpesa/c2b/v1/registerurl", &payload).await
    }
}

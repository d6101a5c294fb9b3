use anyhow::Context;

/// Serialized request bodies above this many kilobytes are rejected.
pub const DEFAULT_MAX_BODY_KB: usize = 5000;

const DEFAULT_MPESA_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

/// Daraja (M-Pesa) client settings.
#[derive(Debug, Clone, Default)]
pub struct MpesaConfig {
    pub base_url: String,
    pub business_short_code: String,
    pub pass_key: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_url: String,
}

/// Immutable process configuration, read from the environment exactly once at
/// startup and injected everywhere it is needed.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub max_body_kb: usize,
    /// Public base URL used in activation/reset links.
    pub host_url: String,
    pub mpesa: MpesaConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let required =
            |key: &str| std::env::var(key).with_context(|| format!("{key} must be set"));
        let optional = |key: &str| std::env::var(key).unwrap_or_default();

        let port = std::env::var("KEJANI_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("KEJANI_PORT must be a port number")?;

        let max_body_kb = match std::env::var("KEJANI_MAX_BODY_KB") {
            Ok(v) => v.parse::<usize>().context("KEJANI_MAX_BODY_KB must be a number")?,
            Err(_) => DEFAULT_MAX_BODY_KB,
        };

        let mpesa = MpesaConfig {
            base_url: std::env::var("KEJANI_MPESA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MPESA_BASE_URL.to_string()),
            business_short_code: optional("KEJANI_MPESA_SHORT_CODE"),
            pass_key: optional("KEJANI_MPESA_PASS_KEY"),
            consumer_key: optional("KEJANI_MPESA_CONSUMER_KEY"),
            consumer_secret: optional("KEJANI_MPESA_CONSUMER_SECRET"),
            callback_url: optional("KEJANI_MPESA_CALLBACK_URL"),
        };
        if mpesa.business_short_code.is_empty() {
            tracing::warn!("KEJANI_MPESA_SHORT_CODE not set; STK push will be rejected upstream");
        }

        Ok(Self {
            port,
            jwt_secret: required("KEJANI_JWT_SECRET")?,
            issuer: required("KEJANI_ISSUER")?,
            audience: required("KEJANI_AUDIENCE")?,
            max_body_kb,
            host_url: std::env::var("KEJANI_HOST_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            mpesa,
        })
    }
}

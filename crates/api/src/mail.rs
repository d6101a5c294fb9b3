use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Outbound mail seam. Delivery transport is an external collaborator; the
/// handlers only need "send this message to this address".
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), MailError>;
}

/// Mailer that writes messages to the log instead of a wire. Used by dev runs
/// and tests.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        _html: Option<&str>,
    ) -> Result<(), MailError> {
        tracing::info!(to, subject, text, "outbound mail (log transport)");
        Ok(())
    }
}

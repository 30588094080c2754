//! Outbound email via the Mailgun messages API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::EmailError;

/// Outbound email delivery — a direct pass-through to the provider API.
///
/// The `From` header is always the gateway's own fixed sending identity;
/// it is never caller-controlled.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

/// Mailgun client — `POST /v3/{domain}/messages`, form-encoded.
pub struct MailgunClient {
    client: reqwest::Client,
    api_base: String,
    api_key: SecretString,
    domain: String,
}

impl MailgunClient {
    pub fn new(api_base: String, api_key: SecretString, domain: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            domain,
        }
    }

    /// The gateway's fixed sending identity.
    fn from_address(&self) -> String {
        format!("XMTP-MX Server <noreply@{}>", self.domain)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v3/{}/messages",
            self.api_base.trim_end_matches('/'),
            self.domain
        )
    }
}

#[async_trait]
impl EmailSender for MailgunClient {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let form = reqwest::multipart::Form::new()
            .text("from", self.from_address())
            .text("to", to.to_string())
            .text("subject", subject.to_string())
            .text("text", body.to_string());

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth("api", Some(self.api_key.expose_secret()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| EmailError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Email sent to {to}");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

//! XMTP network client — HTTP API of a local XMTP node.
//!
//! The node owns the wire protocol and encryption; this client is a thin
//! wrapper exposing `can_message`, `send`, and long-polled conversation and
//! message streams. The signing credential authenticates the gateway's
//! identity to the node.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::XmtpError;

/// Pause between long-poll attempts after a transport error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Long-poll wait passed to the node, in seconds.
const POLL_WAIT_SECS: u32 = 30;

// ── Wire types ──────────────────────────────────────────────────────

/// A logical conversation between the gateway and a peer address.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub topic: String,
    pub peer_address: String,
}

/// A message received on a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct XmtpMessage {
    pub sender_address: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ConversationPage {
    conversations: Vec<Conversation>,
    cursor: String,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    messages: Vec<XmtpMessage>,
    cursor: String,
}

// ── Transport trait ─────────────────────────────────────────────────

pub type ConversationStream = Pin<Box<dyn Stream<Item = Conversation> + Send>>;
pub type XmtpMessageStream = Pin<Box<dyn Stream<Item = XmtpMessage> + Send>>;

/// The gateway's view of the XMTP network.
#[async_trait]
pub trait XmtpTransport: Send + Sync {
    /// Whether `address` has an identity on the network.
    async fn can_message(&self, address: &str) -> Result<bool, XmtpError>;

    /// Send `content` to `address`, opening or reusing the conversation
    /// tagged with `conversation_id`.
    async fn send(
        &self,
        address: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), XmtpError>;

    /// Unbounded stream of newly created conversations. Ends when `cancel`
    /// fires.
    fn stream_conversations(&self, cancel: CancellationToken) -> ConversationStream;

    /// Unbounded stream of messages on one conversation, in arrival order.
    /// Ends when `cancel` fires.
    fn stream_messages(
        &self,
        conversation: &Conversation,
        cancel: CancellationToken,
    ) -> XmtpMessageStream;
}

// ── HTTP client ─────────────────────────────────────────────────────

/// HTTP client for the node API.
pub struct XmtpApiClient {
    client: reqwest::Client,
    base_url: String,
    private_key: SecretString,
}

impl XmtpApiClient {
    pub fn new(base_url: String, private_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            private_key,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl XmtpTransport for XmtpApiClient {
    async fn can_message(&self, address: &str) -> Result<bool, XmtpError> {
        #[derive(Deserialize)]
        struct CanMessage {
            can_message: bool,
        }

        let resp = self
            .client
            .get(self.api_url(&format!("/v1/can-message/{address}")))
            .bearer_auth(self.private_key.expose_secret())
            .send()
            .await
            .map_err(|e| XmtpError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XmtpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: CanMessage = resp
            .json()
            .await
            .map_err(|e| XmtpError::Request(e.to_string()))?;
        Ok(body.can_message)
    }

    async fn send(
        &self,
        address: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), XmtpError> {
        let resp = self
            .client
            .post(self.api_url("/v1/send"))
            .bearer_auth(self.private_key.expose_secret())
            .json(&serde_json::json!({
                "to": address,
                "conversation_id": conversation_id,
                "content": content,
            }))
            .send()
            .await
            .map_err(|e| XmtpError::Request(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        // The node signals an unregistered recipient with 412 (older builds
        // put the phrase in the body instead).
        if status.as_u16() == 412 || body.contains("not on the XMTP network") {
            return Err(XmtpError::NotOnNetwork(address.to_string()));
        }
        Err(XmtpError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn stream_conversations(&self, cancel: CancellationToken) -> ConversationStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url("/v1/conversations");
        let key = self.private_key.clone();

        tokio::spawn(async move {
            let mut cursor = String::new();

            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let wait = POLL_WAIT_SECS.to_string();
                let request = client
                    .get(&url)
                    .bearer_auth(key.expose_secret())
                    .query(&[("cursor", cursor.as_str()), ("wait", wait.as_str())]);

                let resp = tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = request.send() => r,
                };

                match resp {
                    Ok(r) if r.status().is_success() => match r.json::<ConversationPage>().await {
                        Ok(page) => {
                            cursor = page.cursor;
                            for conversation in page.conversations {
                                if tx.send(conversation).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Conversation poll parse error: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                        }
                    },
                    Ok(r) => {
                        tracing::warn!("Conversation poll returned {}", r.status());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                    Err(e) => {
                        tracing::warn!("Conversation poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|c| (c, rx))
        }))
    }

    fn stream_messages(
        &self,
        conversation: &Conversation,
        cancel: CancellationToken,
    ) -> XmtpMessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url(&format!("/v1/conversations/{}/messages", conversation.topic));
        let key = self.private_key.clone();

        tokio::spawn(async move {
            let mut cursor = String::new();

            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let wait = POLL_WAIT_SECS.to_string();
                let request = client
                    .get(&url)
                    .bearer_auth(key.expose_secret())
                    .query(&[("cursor", cursor.as_str()), ("wait", wait.as_str())]);

                let resp = tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = request.send() => r,
                };

                match resp {
                    Ok(r) if r.status().is_success() => match r.json::<MessagePage>().await {
                        Ok(page) => {
                            cursor = page.cursor;
                            for message in page.messages {
                                if tx.send(message).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Message poll parse error: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                        }
                    },
                    Ok(r) => {
                        tracing::warn!("Message poll returned {}", r.status());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                    Err(e) => {
                        tracing::warn!("Message poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|m| (m, rx))
        }))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

//! Shared types for the two translation pipelines.
//!
//! Every translated item is immutable once constructed and owned
//! exclusively by the pipeline stage that consumes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Inbound items ───────────────────────────────────────────────────

/// An email accepted by the SMTP listener, reduced to the fields the
/// gateway consumes. Produced by the MIME parsing layer; consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Correlation id for log lines.
    pub id: Uuid,
    /// Envelope or header sender address.
    pub from: String,
    /// Recipient address; the local part is the target identity name.
    pub to: String,
    /// Plain-text body, relayed verbatim.
    pub text: String,
}

impl InboundEmail {
    pub fn new(from: impl Into<String>, to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            text: text.into(),
        }
    }
}

/// A message received from the XMTP network stream. Consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundXmtpMessage {
    /// Correlation id for log lines.
    pub id: Uuid,
    /// Network address of the sender.
    pub sender_address: String,
    /// Raw text content, expected to carry the relay sub-format.
    pub content: String,
    /// Arrival timestamp.
    pub received_at: DateTime<Utc>,
}

impl InboundXmtpMessage {
    pub fn new(sender_address: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_address: sender_address.into(),
            content: content.into(),
            received_at: Utc::now(),
        }
    }
}

// ── Translated items ────────────────────────────────────────────────

/// Output of the email→XMTP translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedMessage {
    pub recipient_address: String,
    pub content: String,
}

/// Output of the XMTP→email translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

// ── Delivery outcome ────────────────────────────────────────────────

/// Terminal outcome of one inbound item. Nothing is retried or persisted;
/// each item produces exactly one of these, logged and — on the failure
/// path — surfaced through the error notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Handed to the destination substrate.
    Delivered,
    /// The recipient has no identity on the destination network. Expected
    /// and non-fatal; the content is logged for manual follow-up.
    RecipientUnreachable,
    /// Transport-level failure, logged but not retried.
    TransportError { detail: String },
}

impl DeliveryOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::RecipientUnreachable => "recipient_unreachable",
            Self::TransportError { .. } => "transport_error",
        }
    }
}

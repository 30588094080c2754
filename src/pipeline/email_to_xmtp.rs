//! Email → XMTP translation.
//!
//! Extracts the target ENS name from the recipient's local part, resolves
//! it, and hands the body verbatim to the message sender. Validation
//! failures surface to the SMTP layer as a generic processing error;
//! specifics stay in the logs.

use std::sync::Arc;

use mail_parser::MessageParser;

use crate::error::TranslateError;
use crate::pipeline::sender::MessageSender;
use crate::pipeline::types::{DeliveryOutcome, InboundEmail, TranslatedMessage};
use crate::resolver::{ENS_SUFFIX, EnsResolver};

// ── MIME reduction ──────────────────────────────────────────────────

/// Reduce a raw MIME payload to the fields the gateway consumes.
///
/// `envelope_from` is the SMTP MAIL FROM address, used when the payload
/// carries no From header. A payload that fails to parse yields empty
/// fields and is rejected downstream as `MissingRecipient`.
pub fn parse_inbound(envelope_from: &str, raw: &[u8]) -> InboundEmail {
    let Some(parsed) = MessageParser::default().parse(raw) else {
        return InboundEmail::new(envelope_from, "", "");
    };

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| envelope_from.to_string());

    let to = parsed
        .to()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let text = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    InboundEmail::new(from, to, text)
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Identity extraction ─────────────────────────────────────────────

/// Extract and validate the target identity name from an email recipient.
///
/// The local part (before `@`) is the ENS name; it must end with the
/// reserved suffix and carry a non-empty label.
pub fn identity_from_recipient(to: &str) -> Result<String, TranslateError> {
    let to = to.trim();
    if to.is_empty() {
        return Err(TranslateError::MissingRecipient);
    }

    let name = to.split('@').next().unwrap_or_default();
    if !name.ends_with(ENS_SUFFIX) || name.len() == ENS_SUFFIX.len() {
        return Err(TranslateError::InvalidIdentityFormat(name.to_string()));
    }
    Ok(name.to_string())
}

// ── Pipeline ────────────────────────────────────────────────────────

/// The inbound-email pipeline: validate → resolve → send.
pub struct EmailToXmtp {
    resolver: Arc<EnsResolver>,
    sender: MessageSender,
}

impl EmailToXmtp {
    pub fn new(resolver: Arc<EnsResolver>, sender: MessageSender) -> Self {
        Self { resolver, sender }
    }

    /// Translate one inbound email and deliver it.
    ///
    /// Returns the delivery outcome on the happy path; a validation error
    /// means nothing was sent and the caller rejects the SMTP delivery.
    /// Transport failures do not propagate — they are terminal outcomes.
    pub async fn process(&self, email: InboundEmail) -> Result<DeliveryOutcome, TranslateError> {
        let name = identity_from_recipient(&email.to)?;
        tracing::debug!(id = %email.id, "Extracted ENS name: {name}");

        let recipient_address = self.resolver.resolve(&name).await;
        let message = TranslatedMessage {
            recipient_address,
            content: email.text,
        };

        let outcome = self.sender.send(&message).await;
        tracing::info!(
            id = %email.id,
            outcome = outcome.label(),
            "Inbound email processed"
        );
        Ok(outcome)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

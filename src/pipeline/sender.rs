//! XMTP message delivery with outcome mapping.

use std::sync::Arc;

use crate::error::XmtpError;
use crate::pipeline::types::{DeliveryOutcome, TranslatedMessage};
use crate::xmtp::XmtpTransport;

/// Delivers translated messages to the network.
///
/// An unreachable recipient is an expected, non-fatal branch: the outcome
/// is observable and the undelivered content is logged for manual
/// follow-up, but no error propagates. Transport failures are logged and
/// not retried — retry policy is a deployment concern.
pub struct MessageSender {
    transport: Arc<dyn XmtpTransport>,
    /// Conversation tag: the gateway's own ENS identity.
    conversation_id: String,
}

impl MessageSender {
    pub fn new(transport: Arc<dyn XmtpTransport>, conversation_id: String) -> Self {
        Self {
            transport,
            conversation_id,
        }
    }

    /// Send one translated message; always returns a terminal outcome.
    pub async fn send(&self, message: &TranslatedMessage) -> DeliveryOutcome {
        match self.transport.can_message(&message.recipient_address).await {
            Ok(true) => {}
            Ok(false) => return self.unreachable(message),
            Err(e) => {
                tracing::error!(
                    "can_message preflight for {} failed: {e}",
                    message.recipient_address
                );
                return DeliveryOutcome::TransportError {
                    detail: e.to_string(),
                };
            }
        }

        match self
            .transport
            .send(&message.recipient_address, &self.conversation_id, &message.content)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "XMTP message sent from {} to {}",
                    self.conversation_id,
                    message.recipient_address
                );
                DeliveryOutcome::Delivered
            }
            Err(XmtpError::NotOnNetwork(_)) => self.unreachable(message),
            Err(e) => {
                tracing::error!("Error sending XMTP message: {e}");
                DeliveryOutcome::TransportError {
                    detail: e.to_string(),
                }
            }
        }
    }

    fn unreachable(&self, message: &TranslatedMessage) -> DeliveryOutcome {
        tracing::warn!(
            "Recipient {} is not on the XMTP network. Falling back to logging.",
            message.recipient_address
        );
        tracing::info!(
            "Message content for {}: {}",
            message.recipient_address,
            message.content
        );
        DeliveryOutcome::RecipientUnreachable
    }
}

// ── Tests ───────────────────────────────────────────────────────────

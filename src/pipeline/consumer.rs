//! The gateway's control loop over the XMTP side.
//!
//! Subscribes to new conversations indefinitely; each conversation gets
//! its own message subscription, processed strictly in arrival order.
//! Distinct conversations are independent — a slow delivery or
//! notification in one never blocks another. Terminal outcomes fan in to
//! a single bookkeeping loop so every inbound message is observable as
//! exactly one logged outcome.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::email::EmailSender;
use crate::pipeline::types::InboundXmtpMessage;
use crate::pipeline::xmtp_to_email::XmtpToEmail;
use crate::xmtp::XmtpTransport;

/// Subject of the liveness signal sent when the consumer starts.
pub const STARTUP_SUBJECT: &str = "XMTP-MX gateway online";

/// Continuous consumer of the network message stream.
pub struct StreamConsumer {
    transport: Arc<dyn XmtpTransport>,
    pipeline: Arc<XmtpToEmail>,
    email: Arc<dyn EmailSender>,
    operator_address: String,
    cancel: CancellationToken,
}

impl StreamConsumer {
    pub fn new(
        transport: Arc<dyn XmtpTransport>,
        pipeline: Arc<XmtpToEmail>,
        email: Arc<dyn EmailSender>,
        operator_address: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            pipeline,
            email,
            operator_address,
            cancel,
        }
    }

    /// Run until the cancellation token fires or the conversation stream
    /// ends. Outstanding sends complete or are abandoned; no item is left
    /// partially written across stages.
    pub async fn run(&self) -> crate::error::Result<()> {
        self.announce_startup().await;

        let (outcome_tx, mut outcome_rx) =
            tokio::sync::mpsc::channel::<(uuid::Uuid, String)>(256);

        let transport = Arc::clone(&self.transport);
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.cancel.clone();

        let accept = tokio::spawn(async move {
            let mut conversations = transport.stream_conversations(cancel.child_token());

            loop {
                let conversation = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = conversations.next() => match next {
                        Some(conversation) => conversation,
                        None => break,
                    },
                };

                tracing::info!(
                    peer = %conversation.peer_address,
                    topic = %conversation.topic,
                    "New conversation"
                );

                let mut messages =
                    transport.stream_messages(&conversation, cancel.child_token());
                let pipeline = Arc::clone(&pipeline);
                let tx = outcome_tx.clone();
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    // One message at a time: in-conversation ordering.
                    loop {
                        let message = tokio::select! {
                            _ = cancel.cancelled() => break,
                            next = messages.next() => match next {
                                Some(message) => message,
                                None => break,
                            },
                        };

                        // Empty-stream artifacts are the only silent drop.
                        if message.content.trim().is_empty() {
                            tracing::debug!(
                                sender = %message.sender_address,
                                "Dropping empty message"
                            );
                            continue;
                        }

                        let inbound = InboundXmtpMessage::new(
                            message.sender_address,
                            message.content,
                        );
                        let id = inbound.id;

                        let outcome = match pipeline.process(inbound).await {
                            Ok(outcome) => outcome.label().to_string(),
                            Err(e) => format!("rejected: {e}"),
                        };
                        if tx.send((id, outcome)).await.is_err() {
                            break;
                        }
                    }
                });
            }
            // The accept task's sender drops here; per-conversation tasks
            // keep their clones until their streams end.
        });

        while let Some((id, outcome)) = outcome_rx.recv().await {
            tracing::debug!(%id, outcome, "Message reached terminal state");
        }

        accept.await.ok();
        tracing::info!("Stream consumer stopped");
        Ok(())
    }

    /// Liveness signal: an email to the operator. Failure to announce is
    /// logged but does not stop the consumer.
    async fn announce_startup(&self) {
        let body = format!(
            "Gateway started and consuming the XMTP stream (v{}).",
            env!("CARGO_PKG_VERSION")
        );
        if let Err(e) = self
            .email
            .send(&self.operator_address, STARTUP_SUBJECT, &body)
            .await
        {
            tracing::warn!("Failed to send startup notification: {e}");
        } else {
            tracing::info!("Startup notification sent to {}", self.operator_address);
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

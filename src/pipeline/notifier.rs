//! Diagnostic email notifications for translation and delivery failures.

use std::sync::Arc;

use crate::email::EmailSender;

/// Fixed subject line of every failure notification.
pub const FAILURE_SUBJECT: &str = "XMTP-MX delivery failure";

/// Synthesizes diagnostic emails and submits them through the email
/// sender. Its own failures are logged and swallowed — notifying about a
/// notification failure would risk infinite recursion.
#[derive(Clone)]
pub struct ErrorNotifier {
    email: Arc<dyn EmailSender>,
}

impl ErrorNotifier {
    pub fn new(email: Arc<dyn EmailSender>) -> Self {
        Self { email }
    }

    /// Best-effort notification to one recipient. Never fails outward.
    pub async fn notify(&self, error: &(dyn std::fmt::Display + Sync), recipient: &str) {
        let body = format!(
            "The gateway could not relay your message.\n\nReason: {error}\n"
        );

        if let Err(e) = self.email.send(recipient, FAILURE_SUBJECT, &body).await {
            tracing::error!("Failed to deliver error notification to {recipient}: {e}");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

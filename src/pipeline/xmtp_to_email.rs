//! XMTP → email translation.
//!
//! Inbound network messages embed their email envelope in a line-oriented
//! sub-format:
//!
//! ```text
//! To: <identity-or-email>
//! Subject: <text>
//! <blank line>
//! <body lines...>
//! ```
//!
//! The grammar is strict: header lines before the first blank line,
//! newline-preserved body after it, trailing whitespace trimmed once at
//! the end. Only recipients in the reserved `.eth` namespace may be
//! relayed out to email — that is the authorization boundary.

use std::sync::Arc;

use crate::email::EmailSender;
use crate::error::TranslateError;
use crate::pipeline::notifier::ErrorNotifier;
use crate::pipeline::types::{DeliveryOutcome, InboundXmtpMessage, TranslatedEmail};
use crate::resolver::ENS_SUFFIX;

// ── Relay request grammar ───────────────────────────────────────────

/// A parsed relay request embedded in an XMTP message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl RelayRequest {
    /// Parse message content against the relay grammar.
    ///
    /// A missing `Subject:` yields an empty subject; a missing, empty, or
    /// out-of-namespace `To:` is `InvalidRecipient`. The recipient may be
    /// a bare identity (`bob.eth`) or an identity-addressed email
    /// (`bob.eth@example.com`) — in both forms the part before `@` must
    /// end with the reserved suffix.
    pub fn parse(content: &str) -> Result<Self, TranslateError> {
        let mut to: Option<String> = None;
        let mut subject: Option<String> = None;
        let mut body = String::new();
        let mut in_body = false;

        for line in content.lines() {
            if in_body {
                body.push_str(line);
                body.push('\n');
            } else if let Some(rest) = line.strip_prefix("To:") {
                to = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("Subject:") {
                subject = Some(rest.trim().to_string());
            } else if line.trim().is_empty() {
                in_body = true;
            }
        }

        let to = to.unwrap_or_default();
        let identity = to.split('@').next().unwrap_or_default();
        if identity.is_empty() || !identity.ends_with(ENS_SUFFIX) {
            return Err(TranslateError::InvalidRecipient(to));
        }

        Ok(Self {
            to,
            subject: subject.unwrap_or_default(),
            body: body.trim_end().to_string(),
        })
    }

    fn into_email(self) -> TranslatedEmail {
        TranslatedEmail {
            to: self.to,
            subject: self.subject,
            body: self.body,
        }
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

/// The inbound-network-message pipeline: parse → validate → email out,
/// with failures routed to the error notifier.
pub struct XmtpToEmail {
    email: Arc<dyn EmailSender>,
    notifier: ErrorNotifier,
    operator_address: String,
}

impl XmtpToEmail {
    pub fn new(
        email: Arc<dyn EmailSender>,
        notifier: ErrorNotifier,
        operator_address: String,
    ) -> Self {
        Self {
            email,
            notifier,
            operator_address,
        }
    }

    /// Process one network message to its terminal state.
    ///
    /// Exactly one of: a successful outbound email, or one notification
    /// event (two independent best-effort attempts — operator + original
    /// sender). Never both, never neither. Validation failures come back
    /// as `Err` after notification has been dispatched.
    pub async fn process(
        &self,
        message: InboundXmtpMessage,
    ) -> Result<DeliveryOutcome, TranslateError> {
        let request = match RelayRequest::parse(&message.content) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    id = %message.id,
                    sender = %message.sender_address,
                    "Rejected relay request: {e}"
                );
                self.notify_failure(&e, &message.sender_address).await;
                return Err(e);
            }
        };

        let email = request.into_email();
        match self.email.send(&email.to, &email.subject, &email.body).await {
            Ok(()) => {
                tracing::info!(
                    id = %message.id,
                    to = %email.to,
                    "Relayed XMTP message to email"
                );
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                tracing::error!(id = %message.id, "Outbound email failed: {e}");
                self.notify_failure(&e, &message.sender_address).await;
                Ok(DeliveryOutcome::TransportError {
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Notify operator and original sender, independently of each other.
    async fn notify_failure(&self, error: &(dyn std::fmt::Display + Sync), sender: &str) {
        tokio::join!(
            self.notifier.notify(error, &self.operator_address),
            self.notifier.notify(error, sender),
        );
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::EmailError;

    // ── Grammar ─────────────────────────────────────────────────────

    #[test]
    fn parse_full_request() {
        let request =
            RelayRequest::parse("To: bob.eth\nSubject: Hi\n\nline1\nline2").unwrap();
        assert_eq!(request.to, "bob.eth");
        assert_eq!(request.subject, "Hi");
        assert_eq!(request.body, "line1\nline2");
    }

    #[test]
    fn parse_identity_addressed_email_recipient() {
        let request =
            RelayRequest::parse("To: test.eth@xmtp.mx\nSubject: Test Subject\n\nbody").unwrap();
        assert_eq!(request.to, "test.eth@xmtp.mx");
    }

    #[test]
    fn parse_missing_subject_is_empty() {
        let request = RelayRequest::parse("To: bob.eth\n\nbody").unwrap();
        assert_eq!(request.subject, "");
        assert_eq!(request.body, "body");
    }

    #[test]
    fn parse_preserves_interior_newlines_trims_trailing() {
        let request =
            RelayRequest::parse("To: bob.eth\nSubject: s\n\na\n\nb\n\n\n").unwrap();
        assert_eq!(request.body, "a\n\nb");
    }

    #[test]
    fn parse_missing_body_is_empty() {
        let request = RelayRequest::parse("To: bob.eth\nSubject: s").unwrap();
        assert_eq!(request.body, "");
    }

    #[test]
    fn parse_rejects_out_of_namespace_recipient() {
        let err = RelayRequest::parse("To: notanidentity\nSubject: x\n\nbody").unwrap_err();
        assert_eq!(err, TranslateError::InvalidRecipient("notanidentity".into()));
    }

    #[test]
    fn parse_rejects_invalid_dotted_recipient() {
        let err = RelayRequest::parse("To: invalid.address\nSubject: x\n\nbody").unwrap_err();
        assert!(matches!(err, TranslateError::InvalidRecipient(_)));
    }

    #[test]
    fn parse_rejects_missing_recipient() {
        let err = RelayRequest::parse("Subject: x\n\nbody").unwrap_err();
        assert_eq!(err, TranslateError::InvalidRecipient(String::new()));
    }

    #[test]
    fn parse_header_lines_after_blank_are_body() {
        let request = RelayRequest::parse("To: bob.eth\n\nTo: eve.eth\nhello").unwrap();
        assert_eq!(request.to, "bob.eth");
        assert_eq!(request.body, "To: eve.eth\nhello");
    }

    // ── Pipeline ────────────────────────────────────────────────────

    /// Email double: records sends, optionally fails some recipients.
    struct FakeEmail {
        fail_recipients: Vec<String>,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl FakeEmail {
        fn ok() -> Self {
            Self {
                fail_recipients: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing_for(recipients: &[&str]) -> Self {
            Self {
                fail_recipients: recipients.iter().map(|s| s.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmailSender for FakeEmail {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
            if self.fail_recipients.iter().any(|r| r == to) {
                return Err(EmailError::Request(format!("refused for {to}")));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn pipeline_with(email: Arc<FakeEmail>) -> XmtpToEmail {
        let notifier = ErrorNotifier::new(Arc::clone(&email) as Arc<dyn EmailSender>);
        XmtpToEmail::new(email as Arc<dyn EmailSender>, notifier, "operator@xmtp.mx".into())
    }

    #[tokio::test]
    async fn valid_message_is_relayed_once() {
        let email = Arc::new(FakeEmail::ok());
        let pipeline = pipeline_with(Arc::clone(&email));

        let outcome = pipeline
            .process(InboundXmtpMessage::new(
                "0xsender",
                "To: bob.eth\nSubject: Hi\n\nline1\nline2",
            ))
            .await;

        assert_eq!(outcome, Ok(DeliveryOutcome::Delivered));
        let sent = email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("bob.eth".into(), "Hi".into(), "line1\nline2".into()));
    }

    #[tokio::test]
    async fn invalid_recipient_notifies_operator_and_sender() {
        let email = Arc::new(FakeEmail::ok());
        let pipeline = pipeline_with(Arc::clone(&email));

        let outcome = pipeline
            .process(InboundXmtpMessage::new(
                "0xsender",
                "To: notanidentity\nSubject: x\n\nbody",
            ))
            .await;

        assert_eq!(
            outcome,
            Err(TranslateError::InvalidRecipient("notanidentity".into()))
        );
        let sent = email.sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|(to, _, _)| to.as_str()).collect();
        assert_eq!(recipients, vec!["operator@xmtp.mx", "0xsender"]);
        // Both notifications carry the diagnostic subject and reason.
        for (_, subject, body) in sent.iter() {
            assert_eq!(subject, crate::pipeline::notifier::FAILURE_SUBJECT);
            assert!(body.contains("Invalid relay recipient"));
        }
    }

    #[tokio::test]
    async fn notification_attempts_are_failure_isolated() {
        // Operator notification fails; the sender must still be notified.
        let email = Arc::new(FakeEmail::failing_for(&["operator@xmtp.mx"]));
        let pipeline = pipeline_with(Arc::clone(&email));

        let _ = pipeline
            .process(InboundXmtpMessage::new(
                "0xsender",
                "To: notanidentity\n\nbody",
            ))
            .await;

        let sent = email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "0xsender");
    }

    #[tokio::test]
    async fn outbound_transport_failure_notifies() {
        // The relay target fails, the notification recipients do not.
        let email = Arc::new(FakeEmail::failing_for(&["bob.eth"]));
        let pipeline = pipeline_with(Arc::clone(&email));

        let outcome = pipeline
            .process(InboundXmtpMessage::new(
                "0xsender",
                "To: bob.eth\nSubject: Hi\n\nbody",
            ))
            .await;

        assert!(matches!(
            outcome,
            Ok(DeliveryOutcome::TransportError { .. })
        ));
        let sent = email.sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|(to, _, _)| to.as_str()).collect();
        assert_eq!(recipients, vec!["operator@xmtp.mx", "0xsender"]);
    }
}

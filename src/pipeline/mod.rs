//! The two translation pipelines and their shared plumbing.

pub mod consumer;
pub mod email_to_xmtp;
pub mod notifier;
pub mod sender;
pub mod types;
pub mod xmtp_to_email;

pub use consumer::StreamConsumer;
pub use email_to_xmtp::EmailToXmtp;
pub use notifier::ErrorNotifier;
pub use sender::MessageSender;
pub use types::{
    DeliveryOutcome, InboundEmail, InboundXmtpMessage, TranslatedEmail, TranslatedMessage,
};
pub use xmtp_to_email::{RelayRequest, XmtpToEmail};

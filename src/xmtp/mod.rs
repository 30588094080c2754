//! XMTP network access.

pub mod client;

pub use client::{
    Conversation, ConversationStream, XmtpApiClient, XmtpMessage, XmtpMessageStream, XmtpTransport,
};

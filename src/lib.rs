//! XMTP-MX — bidirectional SMTP ⇄ XMTP translation gateway.

pub mod config;
pub mod email;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod smtp;
pub mod xmtp;

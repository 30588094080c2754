//! Outbound email delivery.

pub mod mailgun;

pub use mailgun::{EmailSender, MailgunClient};

//! Error types for the gateway.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("XMTP transport error: {0}")]
    Xmtp(#[from] XmtpError),

    #[error("Email transport error: {0}")]
    Email(#[from] EmailError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors. Fatal — raised only during startup,
/// before any listener or stream is opened.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation failures in either translator.
///
/// Caught at the translator boundary: the email direction maps them to a
/// generic SMTP rejection, the XMTP direction routes them to the error
/// notifier. They never crash the consuming loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("Invalid email: missing recipient")]
    MissingRecipient,

    #[error("Invalid ENS name format: {0}")]
    InvalidIdentityFormat(String),

    #[error("Invalid relay recipient: {0}")]
    InvalidRecipient(String),
}

/// Resolution-layer errors. Internal to the resolver — `resolve()` converts
/// every failure into the fallback address and never surfaces these.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("ENS lookup request failed: {0}")]
    Request(String),

    #[error("ENS lookup returned a malformed response: {0}")]
    Malformed(String),
}

/// Errors from the XMTP network client.
#[derive(Debug, thiserror::Error)]
pub enum XmtpError {
    /// The recipient has no XMTP identity. Expected and non-fatal — the
    /// message sender maps this to `DeliveryOutcome::RecipientUnreachable`.
    #[error("Recipient {0} is not on the XMTP network")]
    NotOnNetwork(String),

    #[error("XMTP API request failed: {0}")]
    Request(String),

    #[error("XMTP API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors from the outbound email provider.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Mailgun request failed: {0}")]
    Request(String),

    #[error("Mailgun returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// SMTP session protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Message exceeds maximum size of {0} bytes")]
    TooLarge(usize),

    #[error("Command timeout")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

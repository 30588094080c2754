//! Gateway configuration, loaded from the environment.
//!
//! Required variables (startup fails without them):
//! `XMTP_PRIVATE_KEY`, `MAILGUN_API_KEY`, `MAILGUN_DOMAIN`, `OPERATOR_ADDRESS`.
//! Everything else has a documented default.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Address substituted when ENS resolution fails.
pub const DEFAULT_FALLBACK_ADDRESS: &str = "0x1234567890123456789012345678901234567890";

/// The gateway's own ENS identity, resolved once at startup and used to
/// tag outbound conversations.
pub const DEFAULT_GATEWAY_SENDER: &str = "xmtpmx.eth";

/// Maximum accepted message size on the SMTP listener: 10 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// SMTP listener bind address.
    pub smtp_listen_addr: String,
    /// Hostname announced in the SMTP greeting.
    pub hostname: String,
    /// Base URL of the local XMTP node HTTP API.
    pub xmtp_api_url: String,
    /// Signing credential for the gateway's XMTP identity.
    pub xmtp_private_key: SecretString,
    /// Base URL of the ENS resolution endpoint.
    pub ens_resolver_url: String,
    /// Address substituted when a name cannot be resolved.
    pub fallback_address: String,
    /// ENS name the gateway sends as.
    pub gateway_sender: String,
    /// Mailgun API credentials and sending domain.
    pub mailgun_api_key: SecretString,
    pub mailgun_domain: String,
    pub mailgun_api_base: String,
    /// Operator identity that receives liveness and failure notifications.
    pub operator_address: String,
    /// Maximum accepted inbound message size in bytes.
    pub max_message_size: usize,
}

impl GatewayConfig {
    /// Build the configuration from environment variables.
    ///
    /// Missing required variables are a fatal configuration error — the
    /// caller must stop startup before any listener or stream is opened.
    pub fn from_env() -> Result<Self, ConfigError> {
        let fallback_address =
            env_or("FALLBACK_XMTP_ADDRESS", DEFAULT_FALLBACK_ADDRESS);
        if !crate::resolver::is_address(&fallback_address) {
            return Err(ConfigError::InvalidValue {
                key: "FALLBACK_XMTP_ADDRESS".into(),
                message: format!("{fallback_address} is not a 0x-prefixed 40-hex-digit address"),
            });
        }

        let max_message_size = match std::env::var("SMTP_MAX_MESSAGE_SIZE") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SMTP_MAX_MESSAGE_SIZE".into(),
                message: format!("{raw} is not a byte count"),
            })?,
            Err(_) => DEFAULT_MAX_MESSAGE_SIZE,
        };

        Ok(Self {
            smtp_listen_addr: env_or("SMTP_LISTEN_ADDR", "0.0.0.0:2525"),
            hostname: env_or("SMTP_HOSTNAME", "xmtp.mx"),
            xmtp_api_url: env_or("XMTP_API_URL", "http://127.0.0.1:5555"),
            xmtp_private_key: SecretString::from(require("XMTP_PRIVATE_KEY")?),
            ens_resolver_url: env_or(
                "ENS_RESOLVER_URL",
                "https://api.ensideas.com/ens/resolve",
            ),
            fallback_address,
            gateway_sender: env_or("GATEWAY_SENDER_NAME", DEFAULT_GATEWAY_SENDER),
            mailgun_api_key: SecretString::from(require("MAILGUN_API_KEY")?),
            mailgun_domain: require("MAILGUN_DOMAIN")?,
            mailgun_api_base: env_or("MAILGUN_API_BASE", "https://api.mailgun.net"),
            operator_address: require("OPERATOR_ADDRESS")?,
            max_message_size,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_address_constant_is_valid() {
        assert!(crate::resolver::is_address(DEFAULT_FALLBACK_ADDRESS));
    }

    #[test]
    fn require_rejects_missing_var() {
        let err = require("XMTP_MX_TEST_UNSET_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "XMTP_MX_TEST_UNSET_VAR"));
    }

    #[test]
    fn env_or_uses_default_when_missing() {
        assert_eq!(env_or("XMTP_MX_TEST_UNSET_VAR", "fallback"), "fallback");
    }
}

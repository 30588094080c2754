use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use xmtp_mx::config::GatewayConfig;
use xmtp_mx::email::{EmailSender, MailgunClient};
use xmtp_mx::pipeline::{EmailToXmtp, ErrorNotifier, MessageSender, StreamConsumer, XmtpToEmail};
use xmtp_mx::resolver::{EnsResolver, HttpNameService, NameService};
use xmtp_mx::smtp::SmtpServer;
use xmtp_mx::xmtp::{XmtpApiClient, XmtpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Missing credentials are fatal before any listener or stream opens.
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("XMTP-MX gateway v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   SMTP: {}", config.smtp_listen_addr);
    eprintln!("   XMTP node: {}", config.xmtp_api_url);
    eprintln!("   Mail domain: {}", config.mailgun_domain);
    eprintln!("   Operator: {}\n", config.operator_address);

    // ── Collaborators ────────────────────────────────────────────────
    let name_service: Arc<dyn NameService> =
        Arc::new(HttpNameService::new(config.ens_resolver_url.clone()));
    let resolver = Arc::new(EnsResolver::new(
        name_service,
        config.fallback_address.clone(),
    ));

    let transport: Arc<dyn XmtpTransport> = Arc::new(XmtpApiClient::new(
        config.xmtp_api_url.clone(),
        config.xmtp_private_key.clone(),
    ));

    let email: Arc<dyn EmailSender> = Arc::new(MailgunClient::new(
        config.mailgun_api_base.clone(),
        config.mailgun_api_key.clone(),
        config.mailgun_domain.clone(),
    ));

    // Resolve the gateway's own sending identity up front. Uses the same
    // fallback policy as any other name.
    let sender_address = resolver.resolve(&config.gateway_sender).await;
    tracing::info!("Using XMTP sender address: {sender_address}");

    let cancel = CancellationToken::new();

    // ── Inbound email → XMTP ─────────────────────────────────────────
    let message_sender = MessageSender::new(Arc::clone(&transport), config.gateway_sender.clone());
    let inbound = Arc::new(EmailToXmtp::new(Arc::clone(&resolver), message_sender));
    let smtp = SmtpServer::new(
        config.smtp_listen_addr.clone(),
        config.hostname.clone(),
        inbound,
        config.max_message_size,
        cancel.clone(),
    );
    let smtp_handle = tokio::spawn(async move {
        if let Err(e) = smtp.run().await {
            tracing::error!("SMTP server exited: {e}");
        }
    });

    // ── Inbound XMTP → email ─────────────────────────────────────────
    let notifier = ErrorNotifier::new(Arc::clone(&email));
    let outbound = Arc::new(XmtpToEmail::new(
        Arc::clone(&email),
        notifier,
        config.operator_address.clone(),
    ));
    let consumer = StreamConsumer::new(
        Arc::clone(&transport),
        outbound,
        Arc::clone(&email),
        config.operator_address.clone(),
        cancel.clone(),
    );
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            tracing::error!("Stream consumer exited: {e}");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Stopping gateway...");
    cancel.cancel();
    let _ = consumer_handle.await;
    let _ = smtp_handle.await;
    tracing::info!("Gateway stopped");

    Ok(())
}

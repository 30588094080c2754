//! SMTP acceptance — TCP listener feeding the inbound-email pipeline.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::pipeline::EmailToXmtp;
use crate::smtp::session::SmtpSession;

pub struct SmtpServer {
    listen_addr: String,
    hostname: String,
    pipeline: Arc<EmailToXmtp>,
    max_message_size: usize,
    cancel: CancellationToken,
}

impl SmtpServer {
    pub fn new(
        listen_addr: String,
        hostname: String,
        pipeline: Arc<EmailToXmtp>,
        max_message_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            listen_addr,
            hostname,
            pipeline,
            max_message_size,
            cancel,
        }
    }

    /// Bind the configured address and serve until cancellation.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("SMTP server listening on {}", self.listen_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("SMTP server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, addr)) => {
                    tracing::debug!("New SMTP connection from {addr}");
                    let session = SmtpSession::new(
                        self.hostname.clone(),
                        Arc::clone(&self.pipeline),
                        self.max_message_size,
                    );
                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket).await {
                            tracing::warn!("SMTP session from {addr} ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {e}");
                }
            }
        }
    }
}

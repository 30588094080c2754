//! SMTP session handling.
//!
//! A deliberately small ESMTP surface: greeting, HELO/EHLO, MAIL, RCPT,
//! DATA, RSET, NOOP, QUIT. Authentication is optional and accepted
//! without verification — the gateway relays to a closed namespace, the
//! authorization boundary is the `.eth` recipient check in the
//! translator. Translation failures are reported to the client as a
//! generic `554`; specifics stay in the logs.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::error::SmtpError;
use crate::pipeline::email_to_xmtp::{EmailToXmtp, parse_inbound};
use crate::smtp::commands::Command;

/// Timeout for reading a command line.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for reading one line of DATA content.
const DATA_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors tolerated before disconnecting the client.
const MAX_ERRORS: usize = 10;

/// Recipients accepted per message.
const MAX_RECIPIENTS: usize = 100;

/// Command lines longer than this are rejected (RFC 5321 allows 512).
const MAX_LINE_LENGTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Greeted,
    MailFrom,
    RcptTo,
}

/// One SMTP session over one connection.
pub struct SmtpSession {
    hostname: String,
    pipeline: Arc<EmailToXmtp>,
    max_message_size: usize,
    state: State,
    from: Option<String>,
    recipients: Vec<String>,
    error_count: usize,
}

impl SmtpSession {
    pub fn new(hostname: String, pipeline: Arc<EmailToXmtp>, max_message_size: usize) -> Self {
        Self {
            hostname,
            pipeline,
            max_message_size,
            state: State::Fresh,
            from: None,
            recipients: Vec::new(),
            error_count: 0,
        }
    }

    fn reset_transaction(&mut self) {
        self.from = None;
        self.recipients.clear();
        if self.state != State::Fresh {
            self.state = State::Greeted;
        }
    }

    /// Drive the session until QUIT, disconnect, or too many errors.
    pub async fn handle<S>(mut self, stream: S) -> Result<(), SmtpError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        reply(&mut writer, &format!("220 {} ESMTP XMTP-MX gateway", self.hostname)).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let n = timeout(COMMAND_TIMEOUT, reader.read_line(&mut line))
                .await
                .map_err(|_| SmtpError::Timeout)??;
            if n == 0 {
                tracing::debug!("Client disconnected");
                return Ok(());
            }
            if n > MAX_LINE_LENGTH {
                if self.too_many_errors(&mut writer).await? {
                    return Ok(());
                }
                reply(&mut writer, "500 Line too long").await?;
                continue;
            }

            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    tracing::debug!("Unparseable command: {e}");
                    if self.too_many_errors(&mut writer).await? {
                        return Ok(());
                    }
                    reply(&mut writer, "500 Syntax error").await?;
                    continue;
                }
            };

            match command {
                Command::Helo(domain) => {
                    self.state = State::Greeted;
                    self.reset_transaction();
                    reply(&mut writer, &format!("250 {} Hello {domain}", self.hostname)).await?;
                }
                Command::Ehlo(domain) => {
                    self.state = State::Greeted;
                    self.reset_transaction();
                    reply(&mut writer, &format!("250-{} Hello {domain}", self.hostname)).await?;
                    reply(&mut writer, "250-8BITMIME").await?;
                    reply(&mut writer, "250-AUTH PLAIN LOGIN").await?;
                    reply(&mut writer, &format!("250 SIZE {}", self.max_message_size)).await?;
                }
                Command::Auth(_) => {
                    // Auth is optional on this listener.
                    reply(&mut writer, "235 2.7.0 Authentication successful").await?;
                }
                Command::MailFrom(address) => {
                    if self.state == State::Fresh {
                        if self.too_many_errors(&mut writer).await? {
                            return Ok(());
                        }
                        reply(&mut writer, "503 Bad sequence: HELO first").await?;
                        continue;
                    }
                    self.reset_transaction();
                    self.from = Some(address);
                    self.state = State::MailFrom;
                    reply(&mut writer, "250 OK").await?;
                }
                Command::RcptTo(address) => {
                    if !matches!(self.state, State::MailFrom | State::RcptTo) {
                        if self.too_many_errors(&mut writer).await? {
                            return Ok(());
                        }
                        reply(&mut writer, "503 Bad sequence: MAIL first").await?;
                        continue;
                    }
                    if self.recipients.len() >= MAX_RECIPIENTS {
                        reply(&mut writer, "452 Too many recipients").await?;
                        continue;
                    }
                    self.recipients.push(address);
                    self.state = State::RcptTo;
                    reply(&mut writer, "250 OK").await?;
                }
                Command::Data => {
                    if self.state != State::RcptTo {
                        if self.too_many_errors(&mut writer).await? {
                            return Ok(());
                        }
                        reply(&mut writer, "503 Bad sequence: RCPT first").await?;
                        continue;
                    }
                    reply(&mut writer, "354 End data with <CR><LF>.<CR><LF>").await?;

                    match read_data(&mut reader, self.max_message_size).await {
                        Ok(data) => {
                            let envelope_from = self.from.clone().unwrap_or_default();
                            let email = parse_inbound(&envelope_from, &data);
                            tracing::info!(
                                id = %email.id,
                                from = %email.from,
                                to = %email.to,
                                "Inbound email accepted"
                            );

                            match self.pipeline.process(email).await {
                                Ok(_outcome) => reply(&mut writer, "250 OK").await?,
                                Err(e) => {
                                    tracing::warn!("Error processing email: {e}");
                                    reply(&mut writer, "554 Error processing email").await?;
                                }
                            }
                        }
                        Err(SmtpError::TooLarge(max)) => {
                            tracing::warn!("Rejected oversized message (> {max} bytes)");
                            reply(&mut writer, "552 Message exceeds maximum size").await?;
                        }
                        Err(e) => return Err(e),
                    }
                    self.reset_transaction();
                }
                Command::Rset => {
                    self.reset_transaction();
                    reply(&mut writer, "250 OK").await?;
                }
                Command::Noop => {
                    reply(&mut writer, "250 OK").await?;
                }
                Command::Quit => {
                    reply(&mut writer, "221 Bye").await?;
                    return Ok(());
                }
                Command::Unknown(verb) => {
                    tracing::debug!("Unknown command: {verb}");
                    if self.too_many_errors(&mut writer).await? {
                        return Ok(());
                    }
                    reply(&mut writer, "502 Command not implemented").await?;
                }
            }
        }
    }

    /// Bump the error counter; disconnect abusive clients.
    async fn too_many_errors<W>(&mut self, writer: &mut W) -> Result<bool, SmtpError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.error_count += 1;
        if self.error_count >= MAX_ERRORS {
            reply(writer, "421 Too many errors, closing connection").await?;
            return Ok(true);
        }
        Ok(false)
    }
}

async fn reply<W>(writer: &mut W, line: &str) -> Result<(), SmtpError>
where
    W: AsyncWrite + Unpin + Send,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read DATA content until the terminating dot, undoing dot-stuffing.
/// Oversized messages are drained to the terminator, then rejected.
async fn read_data<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, SmtpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut data = Vec::new();
    let mut oversized = false;
    let mut line = String::new();

    loop {
        line.clear();
        let n = timeout(DATA_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| SmtpError::Timeout)??;
        if n == 0 {
            return Err(SmtpError::Protocol("connection closed during DATA".into()));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "." {
            if oversized {
                return Err(SmtpError::TooLarge(max_size));
            }
            return Ok(data);
        }

        if oversized {
            continue;
        }

        let content = trimmed.strip_prefix('.').unwrap_or(trimmed);
        data.extend_from_slice(content.as_bytes());
        data.extend_from_slice(b"\r\n");
        if data.len() > max_size {
            oversized = true;
            data.clear();
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

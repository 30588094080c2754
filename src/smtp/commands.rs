//! SMTP command parsing.

use crate::error::SmtpError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// Authentication is optional on this listener; the mechanism and
    /// response are accepted without verification.
    Auth(String),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, SmtpError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(SmtpError::Protocol("empty command".into()));
        }

        let (verb, args) = match line.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" if !args.is_empty() => Ok(Command::Helo(args.to_string())),
            "HELO" => Err(SmtpError::Protocol("HELO requires a domain".into())),
            "EHLO" if !args.is_empty() => Ok(Command::Ehlo(args.to_string())),
            "EHLO" => Err(SmtpError::Protocol("EHLO requires a domain".into())),
            "MAIL" => Ok(Command::MailFrom(path_argument(args, "FROM:")?)),
            "RCPT" => Ok(Command::RcptTo(path_argument(args, "TO:")?)),
            "DATA" => Ok(Command::Data),
            "RSET" => Ok(Command::Rset),
            "NOOP" => Ok(Command::Noop),
            "QUIT" => Ok(Command::Quit),
            "AUTH" => Ok(Command::Auth(args.to_string())),
            other => Ok(Command::Unknown(other.to_string())),
        }
    }
}

/// Extract the address from `FROM:<addr>` / `TO:<addr>` arguments.
/// Angle brackets are optional; ESMTP parameters after the path are
/// ignored.
fn path_argument(args: &str, keyword: &str) -> Result<String, SmtpError> {
    let upper = args.to_ascii_uppercase();
    if !upper.starts_with(keyword) {
        return Err(SmtpError::Protocol(format!(
            "expected {keyword}<address>"
        )));
    }

    let rest = args[keyword.len()..].trim();
    let path = match rest.split_once('>') {
        Some((path, _params)) => path.trim_start_matches('<'),
        None => rest.split_whitespace().next().unwrap_or_default(),
    };
    Ok(path.trim().to_string())
}

// ── Tests ───────────────────────────────────────────────────────────
